//! USB 6-DOF input device contract.
//!
//! Out of scope per spec.md §1 — no driver is implemented here. This module
//! preserves only the polling-loop shape so a concrete driver has an
//! instance-local home for its state, addressing spec.md §9's redesign note
//! on global mutable state in USB device drivers without implementing the
//! excluded drivers themselves.

/// One sample from a 6-degree-of-freedom input device: three translation
/// axes and three rotation axes, each normalized to `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SixDofReport {
    pub translation: [f32; 3],
    pub rotation: [f32; 3],
}

/// Polling contract a concrete USB 6-DOF driver would implement. Each
/// implementation owns its device handle and any decode state as instance
/// fields, rather than as module-level statics.
pub trait SixDofInput: Send {
    fn poll(&mut self) -> SixDofReport;
}
