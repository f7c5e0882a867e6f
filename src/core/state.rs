// src/core/state.rs
// Emulated global pipeline state with scoped save/restore and a render-target stack

use serde::{Deserialize, Serialize};

use super::backend::{ProgramId, TargetId};

/// Per-pixel shading classification carried in the stencil buffer.
///
/// Every rendered pixel holds exactly one class; Background is the clear value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadingClass {
    Background = 0,
    Shaded = 1,
    Flat = 2,
}

impl ShadingClass {
    pub const ALL: [ShadingClass; 3] = [
        ShadingClass::Background,
        ShadingClass::Shaded,
        ShadingClass::Flat,
    ];

    pub fn stencil_reference(self) -> u32 {
        self as u32
    }

    pub fn from_stencil(value: u8) -> Option<Self> {
        match value {
            0 => Some(ShadingClass::Background),
            1 => Some(ShadingClass::Shaded),
            2 => Some(ShadingClass::Flat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Source overwrites destination
    #[default]
    Replace,
    /// `dst + src`
    Additive,
    /// `dst * src`
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthCompare {
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// `None` disables the depth test entirely
    pub test: Option<DepthCompare>,
    pub write: bool,
}

impl DepthState {
    pub const DISABLED: DepthState = DepthState {
        test: None,
        write: false,
    };
    pub const TEST_AND_WRITE: DepthState = DepthState {
        test: Some(DepthCompare::Less),
        write: true,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        DepthState::DISABLED
    }
}

/// Stencil behaviour for subsequent draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilMode {
    #[default]
    Disabled,
    /// Always pass, replace with the class
    Write(ShadingClass),
    /// Pass only where the stored class matches; stencil is read-only
    Equal(ShadingClass),
}

impl StencilMode {
    pub fn writes(self) -> bool {
        matches!(self, StencilMode::Write(_))
    }

    pub fn class(self) -> Option<ShadingClass> {
        match self {
            StencilMode::Disabled => None,
            StencilMode::Write(c) | StencilMode::Equal(c) => Some(c),
        }
    }
}

/// One entry of the render-target stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetBinding {
    pub target: TargetId,
    pub layer: u32,
    pub mip_level: u32,
}

impl TargetBinding {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            layer: 0,
            mip_level: 0,
        }
    }

    pub fn layer(target: TargetId, layer: u32) -> Self {
        Self {
            target,
            layer,
            mip_level: 0,
        }
    }

    pub fn mip(target: TargetId, mip_level: u32) -> Self {
        Self {
            target,
            layer: 0,
            mip_level,
        }
    }
}

/// Fixed-function state resolved into every draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineState {
    pub blend: BlendMode,
    pub depth: DepthState,
    pub stencil: StencilMode,
    pub program: Option<ProgramId>,
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    state: PipelineState,
    target_depth: usize,
}

/// Global pipeline state plus the target stack.
///
/// Scopes nest: `push_scope` snapshots state and stack depth, `pop_scope`
/// restores both.
#[derive(Debug, Default)]
pub struct StateMachine {
    current: PipelineState,
    targets: Vec<TargetBinding>,
    scopes: Vec<Snapshot>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PipelineState {
        &self.current
    }

    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.current
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Snapshot {
            state: self.current,
            target_depth: self.targets.len(),
        });
    }

    /// Restores the innermost snapshot. Returns false if no scope is open.
    pub fn pop_scope(&mut self) -> bool {
        match self.scopes.pop() {
            Some(snapshot) => {
                self.current = snapshot.state;
                self.targets.truncate(snapshot.target_depth);
                true
            }
            None => false,
        }
    }

    pub fn bind_target(&mut self, binding: TargetBinding) {
        self.targets.push(binding);
    }

    /// Pops the top binding, never past the bindings owned by enclosing scopes.
    pub fn unbind_target(&mut self) -> Option<TargetBinding> {
        let base = self.scopes.last().map(|s| s.target_depth).unwrap_or(0);
        if self.targets.len() > base {
            self.targets.pop()
        } else {
            None
        }
    }

    pub fn current_target(&self) -> Option<TargetBinding> {
        self.targets.last().copied()
    }

    pub fn target_stack_len(&self) -> usize {
        self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_restore_state_and_targets() {
        let mut sm = StateMachine::new();
        sm.push_scope();
        sm.bind_target(TargetBinding::new(TargetId(1)));
        sm.state_mut().blend = BlendMode::Additive;

        sm.push_scope();
        sm.bind_target(TargetBinding::new(TargetId(2)));
        sm.bind_target(TargetBinding::layer(TargetId(3), 2));
        sm.state_mut().blend = BlendMode::Multiply;
        sm.state_mut().stencil = StencilMode::Equal(ShadingClass::Shaded);
        assert!(sm.pop_scope());

        assert_eq!(sm.state().blend, BlendMode::Additive);
        assert_eq!(sm.state().stencil, StencilMode::Disabled);
        assert_eq!(sm.current_target(), Some(TargetBinding::new(TargetId(1))));

        assert!(sm.pop_scope());
        assert_eq!(sm.state().blend, BlendMode::Replace);
        assert_eq!(sm.current_target(), None);
        assert!(!sm.pop_scope());
    }

    #[test]
    fn unbind_restores_previous_and_respects_scope_base() {
        let mut sm = StateMachine::new();
        sm.bind_target(TargetBinding::new(TargetId(1)));
        sm.push_scope();
        sm.bind_target(TargetBinding::mip(TargetId(2), 3));
        assert_eq!(sm.unbind_target(), Some(TargetBinding::mip(TargetId(2), 3)));
        assert_eq!(sm.current_target(), Some(TargetBinding::new(TargetId(1))));
        // The outer binding belongs to the enclosing scope
        assert_eq!(sm.unbind_target(), None);
        assert_eq!(sm.target_stack_len(), 1);
    }

    #[test]
    fn stencil_round_trip() {
        for class in ShadingClass::ALL {
            assert_eq!(
                ShadingClass::from_stencil(class.stencil_reference() as u8),
                Some(class)
            );
        }
        assert!(StencilMode::Write(ShadingClass::Flat).writes());
        assert!(!StencilMode::Equal(ShadingClass::Shaded).writes());
    }
}
