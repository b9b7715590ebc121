//! 单位与表达式求值
//!
//! 坐标系的原点、偏移和角度可以是数值，也可以是表达式字符串。
//! 表达式由 [`Evaluator`] 求值为浮点数，引擎内部只处理求值结果。
//!
//! 支持的输入格式：
//! - 纯数字: `10`（长度按模型单位，角度按度）
//! - 带单位: `10mm`、`2.5in`、`30deg`、`0.5rad`
//! - 四则运算与括号: `(10mm + 2) * 3`
//! - 变量: `$width / 2`（需要 [`VariableTable`]）
//! - 常量: `pi`

use crate::math::rad_to_deg;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 长度单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LengthUnit {
    Nanometer,
    Micrometer,
    #[default]
    Millimeter,
    Centimeter,
    Meter,
    Mil,
    Inch,
    Foot,
}

impl LengthUnit {
    /// 1 个单位对应的米数
    pub fn meters(&self) -> f64 {
        match self {
            LengthUnit::Nanometer => 1e-9,
            LengthUnit::Micrometer => 1e-6,
            LengthUnit::Millimeter => 1e-3,
            LengthUnit::Centimeter => 1e-2,
            LengthUnit::Meter => 1.0,
            LengthUnit::Mil => 2.54e-5,
            LengthUnit::Inch => 2.54e-2,
            LengthUnit::Foot => 0.3048,
        }
    }

    /// 单位后缀
    pub fn suffix(&self) -> &'static str {
        match self {
            LengthUnit::Nanometer => "nm",
            LengthUnit::Micrometer => "um",
            LengthUnit::Millimeter => "mm",
            LengthUnit::Centimeter => "cm",
            LengthUnit::Meter => "m",
            LengthUnit::Mil => "mil",
            LengthUnit::Inch => "in",
            LengthUnit::Foot => "ft",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "nm" => Some(LengthUnit::Nanometer),
            "um" => Some(LengthUnit::Micrometer),
            "mm" => Some(LengthUnit::Millimeter),
            "cm" => Some(LengthUnit::Centimeter),
            "m" | "meter" => Some(LengthUnit::Meter),
            "mil" => Some(LengthUnit::Mil),
            "in" => Some(LengthUnit::Inch),
            "ft" => Some(LengthUnit::Foot),
            _ => None,
        }
    }

    /// 将 `value`（本单位）换算到 `target` 单位
    pub fn convert(&self, value: f64, target: LengthUnit) -> f64 {
        if *self == target {
            value
        } else {
            value * self.meters() / target.meters()
        }
    }
}

/// 求值错误
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// 无效格式
    InvalidFormat(String),
    /// 未知单位
    UnknownUnit(String),
    /// 未定义的变量
    UnknownVariable(String),
    /// 量纲不匹配（例如长度加角度）
    DimensionMismatch(String),
    /// 除零
    DivisionByZero,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            EvalError::UnknownUnit(unit) => write!(f, "Unknown unit: {}", unit),
            EvalError::UnknownVariable(name) => write!(f, "Unknown variable: {}", name),
            EvalError::DimensionMismatch(msg) => write!(f, "Dimension mismatch: {}", msg),
            EvalError::DivisionByZero => write!(f, "Division by zero"),
        }
    }
}

impl std::error::Error for EvalError {}

/// 表达式求值器
///
/// 长度结果使用模型单位，角度结果使用度。
pub trait Evaluator: Send + Sync {
    fn eval_length(&self, expr: &str) -> Result<f64, EvalError>;

    fn eval_angle(&self, expr: &str) -> Result<f64, EvalError>;
}

/// 量纲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Scalar,
    Length,
    Angle,
}

impl Dimension {
    fn name(&self) -> &'static str {
        match self {
            Dimension::Scalar => "scalar",
            Dimension::Length => "length",
            Dimension::Angle => "angle",
        }
    }
}

/// 带量纲的数值（长度为模型单位，角度为度）
#[derive(Debug, Clone, Copy, PartialEq)]
struct Quantity {
    value: f64,
    dim: Dimension,
}

impl Quantity {
    fn new(value: f64, dim: Dimension) -> Self {
        Self { value, dim }
    }

    fn add(self, other: Quantity, sign: f64) -> Result<Quantity, EvalError> {
        let dim = match (self.dim, other.dim) {
            (a, b) if a == b => a,
            (Dimension::Scalar, d) | (d, Dimension::Scalar) => d,
            (a, b) => {
                return Err(EvalError::DimensionMismatch(format!(
                    "cannot add {} and {}",
                    a.name(),
                    b.name()
                )))
            }
        };
        Ok(Quantity::new(self.value + sign * other.value, dim))
    }

    fn mul(self, other: Quantity) -> Result<Quantity, EvalError> {
        let dim = match (self.dim, other.dim) {
            (Dimension::Scalar, d) | (d, Dimension::Scalar) => d,
            (a, b) => {
                return Err(EvalError::DimensionMismatch(format!(
                    "cannot multiply {} by {}",
                    a.name(),
                    b.name()
                )))
            }
        };
        Ok(Quantity::new(self.value * other.value, dim))
    }

    fn div(self, other: Quantity) -> Result<Quantity, EvalError> {
        if other.value == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        let dim = match (self.dim, other.dim) {
            (d, Dimension::Scalar) => d,
            (a, b) if a == b => Dimension::Scalar,
            (a, b) => {
                return Err(EvalError::DimensionMismatch(format!(
                    "cannot divide {} by {}",
                    a.name(),
                    b.name()
                )))
            }
        };
        Ok(Quantity::new(self.value / other.value, dim))
    }
}

/// 表达式最大嵌套层数
const MAX_NESTING: usize = 256;

/// 递归下降解析器
///
/// ```text
/// expr   := term (('+' | '-') term)*
/// term   := factor (('*' | '/') factor)*
/// factor := ('+' | '-') factor | '(' expr ')' | number unit? | ident
/// ```
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// 当前嵌套层数（括号与一元符号）
    depth: usize,
    model_units: LengthUnit,
    variables: Option<&'a HashMap<String, Quantity>>,
}

impl<'a> Parser<'a> {
    fn parse(
        input: &'a str,
        model_units: LengthUnit,
        variables: Option<&'a HashMap<String, Quantity>>,
    ) -> Result<Quantity, EvalError> {
        let mut parser = Self {
            input,
            pos: 0,
            depth: 0,
            model_units,
            variables,
        };
        parser.skip_whitespace();
        if parser.peek().is_none() {
            return Err(EvalError::InvalidFormat("Empty expression".to_string()));
        }
        let value = parser.expr()?;
        parser.skip_whitespace();
        if parser.pos < input.len() {
            return Err(EvalError::InvalidFormat(format!(
                "Unexpected input at {}: {}",
                parser.pos,
                &input[parser.pos..]
            )));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if pred(c)) {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn expr(&mut self) -> Result<Quantity, EvalError> {
        let mut value = self.term()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('+') => {
                    self.bump();
                    value = value.add(self.term()?, 1.0)?;
                }
                Some('-') => {
                    self.bump();
                    value = value.add(self.term()?, -1.0)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<Quantity, EvalError> {
        let mut value = self.factor()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') => {
                    self.bump();
                    value = value.mul(self.factor()?)?;
                }
                Some('/') => {
                    self.bump();
                    value = value.div(self.factor()?)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<Quantity, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::InvalidFormat(
                "Expression nested too deeply".to_string(),
            ));
        }
        self.depth += 1;
        let value = self.primary();
        self.depth -= 1;
        value
    }

    fn primary(&mut self) -> Result<Quantity, EvalError> {
        self.skip_whitespace();
        match self.peek() {
            Some('-') => {
                self.bump();
                let inner = self.factor()?;
                Ok(Quantity::new(-inner.value, inner.dim))
            }
            Some('+') => {
                self.bump();
                self.factor()
            }
            Some('(') => {
                self.bump();
                let inner = self.expr()?;
                self.skip_whitespace();
                if self.peek() != Some(')') {
                    return Err(EvalError::InvalidFormat("Missing ')'".to_string()));
                }
                self.bump();
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' || c == '$' => self.identifier(),
            Some(c) => Err(EvalError::InvalidFormat(format!("Unexpected character: {}", c))),
            None => Err(EvalError::InvalidFormat("Unexpected end of expression".to_string())),
        }
    }

    fn number(&mut self) -> Result<Quantity, EvalError> {
        let start = self.pos;
        self.take_while(|c| c.is_ascii_digit() || c == '.');

        // 科学计数法: 1e-3, 2.5E4
        let rest = &self.input[self.pos..];
        let mut exp = rest.chars();
        if matches!(exp.next(), Some('e' | 'E')) {
            let has_digits = match exp.next() {
                Some('+' | '-') => matches!(exp.next(), Some(d) if d.is_ascii_digit()),
                Some(d) => d.is_ascii_digit(),
                None => false,
            };
            if has_digits {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.take_while(|c| c.is_ascii_digit());
            }
        }

        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<f64>()
            .map_err(|_| EvalError::InvalidFormat(format!("Invalid number: {}", literal)))?;

        let unit = self.take_while(|c| c.is_ascii_alphabetic());
        if unit.is_empty() {
            return Ok(Quantity::new(value, Dimension::Scalar));
        }

        match unit {
            "deg" => Ok(Quantity::new(value, Dimension::Angle)),
            "rad" => Ok(Quantity::new(rad_to_deg(value), Dimension::Angle)),
            _ => {
                let length = LengthUnit::from_suffix(unit)
                    .ok_or_else(|| EvalError::UnknownUnit(unit.to_string()))?;
                Ok(Quantity::new(
                    length.convert(value, self.model_units),
                    Dimension::Length,
                ))
            }
        }
    }

    fn identifier(&mut self) -> Result<Quantity, EvalError> {
        let name = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
        if name == "pi" {
            return Ok(Quantity::new(std::f64::consts::PI, Dimension::Scalar));
        }
        self.variables
            .and_then(|vars| vars.get(name))
            .copied()
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
    }
}

fn into_length(q: Quantity) -> Result<f64, EvalError> {
    match q.dim {
        Dimension::Length | Dimension::Scalar => Ok(q.value),
        Dimension::Angle => Err(EvalError::DimensionMismatch(
            "expected a length, found an angle".to_string(),
        )),
    }
}

fn into_angle(q: Quantity) -> Result<f64, EvalError> {
    match q.dim {
        Dimension::Angle | Dimension::Scalar => Ok(q.value),
        Dimension::Length => Err(EvalError::DimensionMismatch(
            "expected an angle, found a length".to_string(),
        )),
    }
}

/// 单位求值器（无变量）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEvaluator {
    model_units: LengthUnit,
}

impl UnitEvaluator {
    pub fn new(model_units: LengthUnit) -> Self {
        Self { model_units }
    }

    pub fn model_units(&self) -> LengthUnit {
        self.model_units
    }
}

impl Evaluator for UnitEvaluator {
    fn eval_length(&self, expr: &str) -> Result<f64, EvalError> {
        into_length(Parser::parse(expr, self.model_units, None)?)
    }

    fn eval_angle(&self, expr: &str) -> Result<f64, EvalError> {
        into_angle(Parser::parse(expr, self.model_units, None)?)
    }
}

/// 带变量表的求值器
///
/// 变量在设置时立即求值并保存量纲，之后的表达式可以引用它们。
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    units: UnitEvaluator,
    variables: HashMap<String, Quantity>,
}

impl VariableTable {
    pub fn new(model_units: LengthUnit) -> Self {
        Self {
            units: UnitEvaluator::new(model_units),
            variables: HashMap::new(),
        }
    }

    /// 设置变量
    ///
    /// 表达式可以引用已定义的变量。
    pub fn set(&mut self, name: impl Into<String>, expr: &str) -> Result<(), EvalError> {
        let name = name.into();
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
        if !valid || name == "pi" {
            return Err(EvalError::InvalidFormat(format!(
                "Invalid variable name: {}",
                name
            )));
        }

        let value = Parser::parse(expr, self.units.model_units, Some(&self.variables))?;
        self.variables.insert(name, value);
        Ok(())
    }

    /// 删除变量
    pub fn remove(&mut self, name: &str) -> bool {
        self.variables.remove(name).is_some()
    }

    /// 获取变量的数值
    pub fn get(&self, name: &str) -> Option<f64> {
        self.variables.get(name).map(|q| q.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl Evaluator for VariableTable {
    fn eval_length(&self, expr: &str) -> Result<f64, EvalError> {
        into_length(Parser::parse(
            expr,
            self.units.model_units,
            Some(&self.variables),
        )?)
    }

    fn eval_angle(&self, expr: &str) -> Result<f64, EvalError> {
        into_angle(Parser::parse(
            expr,
            self.units.model_units,
            Some(&self.variables),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_plain_numbers() {
        let eval = UnitEvaluator::default();
        assert_eq!(eval.eval_length("10").unwrap(), 10.0);
        assert_eq!(eval.eval_length("-2.5").unwrap(), -2.5);
        assert!(approx(eval.eval_length("1e-3").unwrap(), 0.001));
        assert_eq!(eval.eval_angle("30").unwrap(), 30.0);
    }

    #[test]
    fn test_length_units() {
        let eval = UnitEvaluator::default();
        assert_eq!(eval.eval_length("10mm").unwrap(), 10.0);
        assert!(approx(eval.eval_length("1in").unwrap(), 25.4));
        assert!(approx(eval.eval_length("2cm").unwrap(), 20.0));

        let meters = UnitEvaluator::new(LengthUnit::Meter);
        assert!(approx(meters.eval_length("250mm").unwrap(), 0.25));
    }

    #[test]
    fn test_angle_units() {
        let eval = UnitEvaluator::default();
        assert_eq!(eval.eval_angle("30deg").unwrap(), 30.0);
        assert!(eval.eval_angle("pi rad").is_err());
        assert!(approx(eval.eval_angle("0.5rad").unwrap(), 0.5_f64.to_degrees()));
        assert!(approx(eval.eval_angle("pi * 1rad").unwrap(), 180.0));
    }

    #[test]
    fn test_arithmetic() {
        let eval = UnitEvaluator::default();
        assert!(approx(eval.eval_length("(10mm + 2) * 3").unwrap(), 36.0));
        assert!(approx(eval.eval_length("1cm - 4mm").unwrap(), 6.0));
        assert!(approx(eval.eval_angle("90deg / 2").unwrap(), 45.0));
        assert!(approx(eval.eval_length("-(3mm)").unwrap(), -3.0));
    }

    #[test]
    fn test_dimension_errors() {
        let eval = UnitEvaluator::default();
        assert!(matches!(
            eval.eval_length("30deg"),
            Err(EvalError::DimensionMismatch(_))
        ));
        assert!(matches!(
            eval.eval_length("1mm + 1deg"),
            Err(EvalError::DimensionMismatch(_))
        ));
        assert!(matches!(
            eval.eval_length("1mm * 1mm"),
            Err(EvalError::DimensionMismatch(_))
        ));
        assert_eq!(eval.eval_length("1 / 0"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_invalid_input() {
        let eval = UnitEvaluator::default();
        assert!(matches!(eval.eval_length(""), Err(EvalError::InvalidFormat(_))));
        assert!(matches!(eval.eval_length("(1 + 2"), Err(EvalError::InvalidFormat(_))));
        assert!(matches!(eval.eval_length("10furlong"), Err(EvalError::UnknownUnit(_))));
        assert!(matches!(eval.eval_length("width"), Err(EvalError::UnknownVariable(_))));
    }

    #[test]
    fn test_nesting_limit() {
        let eval = UnitEvaluator::default();
        let shallow = format!("{}1mm{}", "(".repeat(100), ")".repeat(100));
        assert!(approx(eval.eval_length(&shallow).unwrap(), 1.0));
        assert!(approx(eval.eval_length(&format!("{}5", "-".repeat(100))).unwrap(), 5.0));

        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(
            eval.eval_length(&deep),
            Err(EvalError::InvalidFormat("Expression nested too deeply".to_string()))
        );
        let signs = format!("{}1", "-".repeat(200_000));
        assert!(matches!(eval.eval_angle(&signs), Err(EvalError::InvalidFormat(_))));

        let mut vars = VariableTable::default();
        assert!(vars.set("$deep", &deep).is_err());
        assert!(!vars.contains("$deep"));
    }

    #[test]
    fn test_variables() {
        let mut vars = VariableTable::default();
        vars.set("$width", "20mm").unwrap();
        vars.set("half", "$width / 2").unwrap();
        vars.set("tilt", "15deg").unwrap();

        assert_eq!(vars.get("half"), Some(10.0));
        assert!(approx(vars.eval_length("half + 1in").unwrap(), 35.4));
        assert!(approx(vars.eval_angle("tilt * 2").unwrap(), 30.0));
        assert!(vars.eval_length("tilt").is_err());

        assert!(vars.set("1bad", "1").is_err());
        assert!(vars.remove("half"));
        assert!(!vars.contains("half"));
    }
}
