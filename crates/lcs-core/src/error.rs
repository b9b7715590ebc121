//! 坐标系操作错误定义

use crate::anchor::Anchor;
use crate::expression::EvalError;
use crate::registry::FrameId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Name already in use: {0}")]
    NameCollision(String),

    #[error("Invalid coordinate system name: {0:?}")]
    InvalidName(String),

    #[error("Unknown parent coordinate system: {0}")]
    UnknownParent(String),

    #[error("Unknown coordinate system: {0}")]
    UnknownFrame(FrameId),

    #[error("Re-parenting {frame} under {parent} would create a cycle")]
    WouldCreateCycle { frame: FrameId, parent: FrameId },

    #[error("Degenerate axes: pointing vectors are parallel or zero-length")]
    DegenerateAxes,

    #[error("Coordinate system {0} has children")]
    HasChildren(FrameId),

    #[error("Anchor could not be resolved: {0}")]
    AnchorUnresolved(Anchor),

    #[error("Anchor {anchor} does not belong to {owner}")]
    AnchorMismatch { anchor: Anchor, owner: Anchor },

    #[error("Invalid mode: expected {expected}, found {found}")]
    InvalidMode {
        expected: &'static str,
        found: &'static str,
    },

    #[error("The Global coordinate system cannot be modified")]
    GlobalImmutable,

    #[error("Registry invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Too many coordinate systems")]
    CapacityExceeded,

    #[error("Expression error: {0}")]
    Expression(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
