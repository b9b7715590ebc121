//! 坐标系注册表
//!
//! 以 arena 保存所有命名坐标系，组成以隐式 "Global" 为根的树：
//! - 名称唯一（"Global" 为保留名）
//! - 父引用为稳定句柄 [`FrameId`]，删除后句柄不会复用
//! - 所有修改操作先校验再提交，失败时注册表保持不变
//!
//! 方向四元数按坐标系缓存，修改定义时与定义一起替换。

use crate::anchor::{GeometryProvider, NoGeometry};
use crate::definition::{FrameDefinition, FrameKind, Offset, Origin, OrientationSpec};
use crate::error::{FrameError, Result};
use crate::expression::{Evaluator, UnitEvaluator};
use crate::math::{self, Quaternion};
use crate::resolver::Resolver;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// 全局坐标系名称
pub const GLOBAL_NAME: &str = "Global";

/// 坐标系句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(u32);

impl FrameId {
    /// 隐式全局坐标系
    pub const GLOBAL: FrameId = FrameId(0);

    pub fn is_global(&self) -> bool {
        *self == Self::GLOBAL
    }

    fn from_index(index: usize) -> Result<Self> {
        u32::try_from(index)
            .map(FrameId)
            .map_err(|_| FrameError::CapacityExceeded)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "{}", GLOBAL_NAME)
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// 命名坐标系
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    id: FrameId,
    name: String,
    /// `None` 表示父坐标系为 Global
    parent: Option<FrameId>,
    definition: FrameDefinition,
    /// 相对父坐标系的方向四元数
    #[serde(skip)]
    cache: OnceLock<Quaternion>,
}

impl Frame {
    fn new(id: FrameId, name: String, parent: FrameId, definition: FrameDefinition) -> Self {
        Self {
            id,
            name,
            parent: (!parent.is_global()).then_some(parent),
            definition,
            cache: OnceLock::new(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    /// 父坐标系句柄（Global 为 [`FrameId::GLOBAL`]）
    pub fn parent_id(&self) -> FrameId {
        self.parent.unwrap_or(FrameId::GLOBAL)
    }

    pub fn definition(&self) -> &FrameDefinition {
        &self.definition
    }

    pub fn kind(&self) -> FrameKind {
        self.definition.kind()
    }

    pub fn cached_quaternion(&self) -> Option<&Quaternion> {
        self.cache.get()
    }

    pub(crate) fn store_quaternion(&self, q: Quaternion) {
        if self.definition.is_cacheable() {
            debug_assert!(math::is_unit(&q));
            let _ = self.cache.set(q);
        }
    }

    fn replace_definition(&mut self, definition: FrameDefinition) {
        self.definition = definition;
        self.cache = OnceLock::new();
    }
}

/// 删除策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeletePolicy {
    /// 子坐标系挂到被删除坐标系的父坐标系下
    #[default]
    CascadeChildrenUp,
    /// 有子坐标系时拒绝删除
    RejectIfHasChildren,
    /// 连同所有后代一起删除
    CascadeDelete,
}

/// 注册表配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// 自动命名前缀（CS1, CS2, ...）
    pub auto_name_prefix: String,
    /// [`Registry::remove`] 使用的删除策略
    pub default_delete_policy: DeletePolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auto_name_prefix: "CS".to_string(),
            default_delete_policy: DeletePolicy::CascadeChildrenUp,
        }
    }
}

/// 坐标系注册表
pub struct Registry {
    config: RegistryConfig,
    /// 索引即 FrameId；0 号槽位属于 Global，始终为空
    frames: Vec<Option<Frame>>,
    names: HashMap<String, FrameId>,
    geometry: Arc<dyn GeometryProvider>,
    evaluator: Arc<dyn Evaluator>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("frames", &self.iter().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            frames: vec![None],
            names: HashMap::new(),
            geometry: Arc::new(NoGeometry),
            evaluator: Arc::new(UnitEvaluator::default()),
        }
    }

    /// 设置几何提供者
    pub fn with_geometry(mut self, geometry: Arc<dyn GeometryProvider>) -> Self {
        self.geometry = geometry;
        self
    }

    /// 设置表达式求值器
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.set_evaluator(evaluator);
        self
    }

    pub fn set_geometry(&mut self, geometry: Arc<dyn GeometryProvider>) {
        self.geometry = geometry;
    }

    /// 替换求值器（缓存的四元数不含表达式，无需失效）
    pub fn set_evaluator(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluator = evaluator;
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn geometry(&self) -> &dyn GeometryProvider {
        self.geometry.as_ref()
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    /// 坐标变换查询
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self)
    }

    // ========== 查询 ==========

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Frame> {
        self.names.get(name).and_then(|id| self.get(*id))
    }

    /// 名称 -> 句柄（"Global" 返回 [`FrameId::GLOBAL`]）
    pub fn id_of(&self, name: &str) -> Option<FrameId> {
        if name == GLOBAL_NAME {
            Some(FrameId::GLOBAL)
        } else {
            self.names.get(name).copied()
        }
    }

    /// 句柄是否有效（Global 始终有效）
    pub fn contains(&self, id: FrameId) -> bool {
        id.is_global() || self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.frames.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 直接子坐标系
    ///
    /// 迭代器借用注册表，任何结构修改都会使其失效。
    pub fn children_of(&self, id: FrameId) -> impl Iterator<Item = FrameId> + '_ {
        self.iter()
            .filter(move |frame| frame.parent_id() == id)
            .map(Frame::id)
    }

    /// 所有后代（广度优先）
    pub fn descendants_of(&self, id: FrameId) -> Vec<FrameId> {
        let mut result: Vec<FrameId> = self.children_of(id).collect();
        let mut next = 0;
        while next < result.len() {
            let current = result[next];
            result.extend(self.children_of(current));
            next += 1;
        }
        result
    }

    /// 祖先链：从直接父坐标系到 Global（含 Global）
    pub fn ancestors_of(&self, id: FrameId) -> Vec<FrameId> {
        let mut result = Vec::new();
        let mut current = id;
        while let Some(frame) = self.get(current) {
            current = frame.parent_id();
            result.push(current);
            if result.len() > self.frames.len() {
                break;
            }
        }
        result
    }

    /// 到 Global 的层数（Global 为 0）
    pub fn depth(&self, id: FrameId) -> usize {
        self.ancestors_of(id).len()
    }

    fn is_ancestor(&self, ancestor: FrameId, id: FrameId) -> bool {
        self.ancestors_of(id).contains(&ancestor)
    }

    // ========== 校验 ==========

    fn frame_for_update(&self, id: FrameId) -> Result<&Frame> {
        if id.is_global() {
            return Err(FrameError::GlobalImmutable);
        }
        self.get(id).ok_or(FrameError::UnknownFrame(id))
    }

    fn check_name(&self, name: &str, owner: Option<FrameId>) -> Result<()> {
        if name.trim().is_empty() || name.trim() != name {
            return Err(FrameError::InvalidName(name.to_string()));
        }
        if name == GLOBAL_NAME {
            return Err(FrameError::NameCollision(name.to_string()));
        }
        match self.names.get(name) {
            Some(existing) if Some(*existing) != owner => {
                Err(FrameError::NameCollision(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn check_parent(&self, id: Option<FrameId>, parent: FrameId) -> Result<()> {
        if !self.contains(parent) {
            return Err(FrameError::UnknownParent(parent.to_string()));
        }
        if let Some(id) = id {
            if parent == id || self.is_ancestor(id, parent) {
                return Err(FrameError::WouldCreateCycle { frame: id, parent });
            }
        }
        Ok(())
    }

    fn check_definition(&self, definition: &FrameDefinition) -> Result<()> {
        definition.validate()?;
        definition.validate_anchors(self.geometry.as_ref())
    }

    fn generate_name(&self) -> String {
        let prefix = &self.config.auto_name_prefix;
        (1..)
            .map(|n| format!("{}{}", prefix, n))
            .find(|name| name != GLOBAL_NAME && !self.names.contains_key(name))
            .unwrap_or_else(|| format!("{}{}", prefix, self.frames.len()))
    }

    /// 完整的树不变量检查
    ///
    /// - 父引用有效、无环、最终到达 Global
    /// - 名称索引与 arena 一致
    /// - 缓存的四元数为单位长度
    ///
    /// 修改操作在提交前逐项校验输入，提交后的树总满足这些不变量；
    /// 本检查用于宿主自检和调试构建下的断言。
    pub fn check_invariants(&self) -> Result<()> {
        let violated = |message: String| Err(FrameError::InvariantViolated(message));

        if self.frames.first().is_some_and(Option::is_some) {
            return violated("slot of the Global frame is occupied".to_string());
        }

        for frame in self.iter() {
            let mut current = frame.parent_id();
            let mut steps = 0;
            while !current.is_global() {
                if current == frame.id || steps > self.frames.len() {
                    return violated(format!("{} is its own ancestor", frame.id));
                }
                let Some(parent) = self.get(current) else {
                    return violated(format!("{} has a dangling parent {}", frame.id, current));
                };
                current = parent.parent_id();
                steps += 1;
            }

            if self.names.get(&frame.name) != Some(&frame.id) {
                return violated(format!("name index out of date for {}", frame.name));
            }

            if let Some(q) = frame.cached_quaternion() {
                if !math::is_unit(q) {
                    return violated(format!("cached quaternion of {} is not unit", frame.name));
                }
            }
        }

        if self.names.len() != self.iter().count() {
            return violated(format!(
                "{} names for {} coordinate systems",
                self.names.len(),
                self.iter().count()
            ));
        }
        Ok(())
    }

    fn debug_check(&self) {
        debug_assert!(
            self.check_invariants().is_ok(),
            "registry invariant violated: {:?}",
            self.check_invariants()
        );
    }

    // ========== 修改 ==========

    /// 创建坐标系
    ///
    /// `name` 为 `None` 时自动生成唯一名称；顶层坐标系的 `parent` 为 [`FrameId::GLOBAL`]。
    pub fn create(
        &mut self,
        definition: FrameDefinition,
        name: Option<&str>,
        parent: FrameId,
    ) -> Result<FrameId> {
        let name = match name {
            Some(name) => {
                self.check_name(name, None)?;
                name.to_string()
            }
            None => self.generate_name(),
        };
        self.check_parent(None, parent)?;
        self.check_definition(&definition).inspect_err(|e| {
            tracing::debug!("Rejected coordinate system {}: {}", name, e);
        })?;

        let id = FrameId::from_index(self.frames.len())?;
        tracing::info!(
            "Created coordinate system {} ({}, {}) under {}",
            name,
            id,
            definition.kind().name(),
            parent
        );

        self.names.insert(name.clone(), id);
        self.frames.push(Some(Frame::new(id, name, parent, definition)));
        self.debug_check();
        Ok(id)
    }

    /// 重命名
    pub fn rename(&mut self, id: FrameId, new_name: &str) -> Result<()> {
        self.edit(id).name(new_name).commit()
    }

    /// 修改父坐标系
    ///
    /// 坐标系的定义保持不变（仍相对新的父坐标系解释）。
    pub fn set_parent(&mut self, id: FrameId, new_parent: FrameId) -> Result<()> {
        self.edit(id).parent(new_parent).commit()
    }

    pub fn set_definition(&mut self, id: FrameId, definition: FrameDefinition) -> Result<()> {
        self.edit(id).definition(definition).commit()
    }

    pub fn set_orientation(&mut self, id: FrameId, orientation: OrientationSpec) -> Result<()> {
        self.edit(id).orientation(orientation).commit()
    }

    pub fn set_origin(&mut self, id: FrameId, origin: Origin) -> Result<()> {
        self.edit(id).origin(origin).commit()
    }

    pub fn set_offset(&mut self, id: FrameId, offset: Offset) -> Result<()> {
        self.edit(id).offset(offset).commit()
    }

    pub fn set_always_move_with_entity(&mut self, id: FrameId, value: bool) -> Result<()> {
        self.edit(id).always_move_with_entity(value).commit()
    }

    /// 批量修改，调用 [`FrameEdit::commit`] 后一次性生效
    pub fn edit(&mut self, id: FrameId) -> FrameEdit<'_> {
        FrameEdit {
            registry: self,
            id,
            name: None,
            parent: None,
            definition: None,
            orientation: None,
            origin: None,
            offset: None,
            always_move: None,
        }
    }

    /// 删除坐标系
    pub fn delete(&mut self, id: FrameId, policy: DeletePolicy) -> Result<()> {
        let frame = self.frame_for_update(id)?;
        let parent = frame.parent;
        let children: Vec<FrameId> = self.children_of(id).collect();

        let removed = match policy {
            DeletePolicy::RejectIfHasChildren if !children.is_empty() => {
                tracing::debug!("Refused to delete {}: {} children", id, children.len());
                return Err(FrameError::HasChildren(id));
            }
            DeletePolicy::RejectIfHasChildren => vec![id],
            DeletePolicy::CascadeChildrenUp => {
                // 子坐标系改挂到祖父坐标系下，全局位姿不变
                let new_parent = parent.unwrap_or(FrameId::GLOBAL);
                let resolver = self.resolver();
                let rebased = children
                    .iter()
                    .map(|child| -> Result<(FrameId, FrameDefinition)> {
                        Ok((*child, resolver.rebase(*child, new_parent)?))
                    })
                    .collect::<Result<Vec<_>>>()
                    .inspect_err(|e| {
                        tracing::debug!("Refused to delete {}: {}", id, e);
                    })?;

                for (child, definition) in rebased {
                    if let Some(Some(frame)) = self.frames.get_mut(child.0 as usize) {
                        frame.parent = parent;
                        frame.replace_definition(definition);
                    }
                }
                vec![id]
            }
            DeletePolicy::CascadeDelete => {
                let mut removed = vec![id];
                removed.extend(self.descendants_of(id));
                removed
            }
        };

        for id in &removed {
            if let Some(frame) = self.frames.get_mut(id.0 as usize).and_then(Option::take) {
                self.names.remove(&frame.name);
                tracing::info!("Deleted coordinate system {} ({})", frame.name, id);
            }
        }
        self.debug_check();
        Ok(())
    }

    /// 使用配置的默认策略删除
    pub fn remove(&mut self, id: FrameId) -> Result<()> {
        self.delete(id, self.config.default_delete_policy)
    }

    /// 把坐标系提升为顶层坐标系，位置与方向保持不变
    ///
    /// 子坐标系相对它定义，因此也保持不变。
    pub fn promote_to_global(&mut self, id: FrameId) -> Result<()> {
        let definition = self.resolver().flatten_to_global(id)?;
        self.edit(id)
            .definition(definition)
            .parent(FrameId::GLOBAL)
            .commit()
    }
}

/// 坐标系修改事务
///
/// 所有字段在 [`FrameEdit::commit`] 时统一校验，任一失败则不做任何修改。
#[must_use = "edits take effect only after commit()"]
pub struct FrameEdit<'r> {
    registry: &'r mut Registry,
    id: FrameId,
    name: Option<String>,
    parent: Option<FrameId>,
    definition: Option<FrameDefinition>,
    orientation: Option<OrientationSpec>,
    origin: Option<Origin>,
    offset: Option<Offset>,
    always_move: Option<bool>,
}

impl FrameEdit<'_> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn parent(mut self, parent: FrameId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// 替换整个定义（其余字段修改在其基础上叠加）
    pub fn definition(mut self, definition: FrameDefinition) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn orientation(mut self, orientation: OrientationSpec) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn always_move_with_entity(mut self, value: bool) -> Self {
        self.always_move = Some(value);
        self
    }

    fn staged_definition(&mut self) -> Result<Option<FrameDefinition>> {
        let touches_definition = self.definition.is_some()
            || self.orientation.is_some()
            || self.origin.is_some()
            || self.offset.is_some()
            || self.always_move.is_some();
        if !touches_definition {
            return Ok(None);
        }

        let mut definition = match self.definition.take() {
            Some(definition) => definition,
            None => self.registry.frame_for_update(self.id)?.definition.clone(),
        };
        if let Some(spec) = self.orientation.take() {
            definition = definition.with_orientation(spec)?;
        }
        if let Some(origin) = self.origin.take() {
            definition = definition.with_origin(origin)?;
        }
        if let Some(offset) = self.offset.take() {
            definition = definition.with_offset(offset)?;
        }
        if let Some(value) = self.always_move.take() {
            definition = definition.with_always_move_with_entity(value)?;
        }
        self.registry.check_definition(&definition)?;
        Ok(Some(definition))
    }

    /// 校验并提交
    pub fn commit(mut self) -> Result<()> {
        let id = self.id;
        let old_name = self.registry.frame_for_update(id)?.name.clone();

        if let Some(name) = &self.name {
            self.registry.check_name(name, Some(id))?;
        }
        if let Some(parent) = self.parent {
            self.registry.check_parent(Some(id), parent)?;
        }
        let definition = self.staged_definition().inspect_err(|e| {
            tracing::debug!("Rejected edit of {}: {}", old_name, e);
        })?;

        // 校验全部通过，开始提交
        let registry = self.registry;
        let Some(Some(frame)) = registry.frames.get_mut(id.0 as usize) else {
            return Err(FrameError::UnknownFrame(id));
        };
        if let Some(name) = self.name.take() {
            if name != old_name {
                registry.names.remove(&old_name);
                registry.names.insert(name.clone(), id);
                tracing::info!("Renamed coordinate system {} -> {}", old_name, name);
                frame.name = name;
            }
        }
        if let Some(parent) = self.parent {
            frame.parent = (!parent.is_global()).then_some(parent);
            tracing::info!("Moved coordinate system {} under {}", frame.name, parent);
        }
        if let Some(definition) = definition {
            frame.replace_definition(definition);
            tracing::debug!("Updated definition of coordinate system {}", frame.name);
        }

        registry.debug_check();
        Ok(())
    }
}
