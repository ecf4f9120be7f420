//! The lexically-scoped local variable stack.

use mlr_core::{MultiLevelMap, TypeMask, Value};
use mlr_cst::cst::FrameLayout;

use crate::error::RuntimeError;
use crate::eval::EvalValue;

#[derive(Debug, Clone)]
enum SlotValue {
    Scalar(Value),
    Map(MultiLevelMap),
}

struct Frame {
    slots: Vec<SlotValue>,
    masks: Vec<TypeMask>,
    names: Vec<String>,
}

/// A stack of call frames, each with a fixed number of slots determined at
/// CST-build time. Access is always by precomputed frame-relative index;
/// names are never looked up at run time.
#[derive(Default)]
pub struct LocalStack {
    frames: Vec<Frame>,
}

impl LocalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_frame(&mut self, layout: &FrameLayout) {
        let slots = layout
            .slots
            .iter()
            .map(|s| {
                if s.type_mask == TypeMask::MAP {
                    SlotValue::Map(MultiLevelMap::new())
                } else {
                    SlotValue::Scalar(Value::Absent)
                }
            })
            .collect();
        let masks = layout.slots.iter().map(|s| s.type_mask).collect();
        let names = layout.slots.iter().map(|s| s.name.clone()).collect();
        self.frames.push(Frame { slots, masks, names });
    }

    pub fn exit_frame(&mut self) {
        self.frames.pop();
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    /// Reset a block's sub-frame slots to `Absent`/empty-map on scope
    /// entry.
    pub fn enter_subframe(&mut self, start: u32, len: u32) {
        self.reset_subframe(start, len);
    }

    /// Release a block's sub-frame slots on scope exit.
    pub fn exit_subframe(&mut self, start: u32, len: u32) {
        self.reset_subframe(start, len);
    }

    fn reset_subframe(&mut self, start: u32, len: u32) {
        let frame = self.frame_mut();
        for i in start..(start + len) {
            let i = i as usize;
            if i >= frame.slots.len() {
                break;
            }
            frame.slots[i] = if frame.masks[i] == TypeMask::MAP {
                SlotValue::Map(MultiLevelMap::new())
            } else {
                SlotValue::Scalar(Value::Absent)
            };
        }
    }

    pub fn define(&mut self, slot: u32, value: Value) -> Result<(), RuntimeError> {
        self.assign_scalar(slot, value)
    }

    pub fn assign_scalar(&mut self, slot: u32, value: Value) -> Result<(), RuntimeError> {
        if value.is_absent() {
            return Ok(());
        }
        let frame = self.frame_mut();
        let mask = frame.masks[slot as usize];
        if !mask.accepts(&value) {
            return Err(RuntimeError::TypeMaskViolation(format!("slot {slot}")));
        }
        frame.slots[slot as usize] = SlotValue::Scalar(value);
        Ok(())
    }

    pub fn assign_map(&mut self, slot: u32, keypath: &[Value], value: EvalValue) -> Result<(), RuntimeError> {
        let frame = self.frame_mut();
        let mask = frame.masks[slot as usize];
        if keypath.is_empty() {
            match value {
                EvalValue::Map(m) => {
                    frame.slots[slot as usize] = SlotValue::Map(m);
                    Ok(())
                }
                EvalValue::Scalar(v) => self.assign_scalar(slot, v),
            }
        } else {
            if mask != TypeMask::MAP {
                return Err(RuntimeError::ScalarOnlyLocal(format!("slot {slot}")));
            }
            let scalar = value.into_scalar();
            if scalar.is_absent() {
                return Ok(());
            }
            match &mut frame.slots[slot as usize] {
                SlotValue::Map(m) => {
                    m.put_terminal(keypath, scalar);
                    Ok(())
                }
                SlotValue::Scalar(_) => Err(RuntimeError::ScalarOnlyLocal(format!("slot {slot}"))),
            }
        }
    }

    pub fn get_scalar(&self, slot: u32) -> Value {
        match &self.frame().slots[slot as usize] {
            SlotValue::Scalar(v) => v.clone(),
            SlotValue::Map(_) => Value::Error,
        }
    }

    pub fn get_map_value(&self, slot: u32, keypath: &[Value]) -> EvalValue {
        let entry = &self.frame().slots[slot as usize];
        match entry {
            SlotValue::Scalar(v) => {
                if keypath.is_empty() {
                    EvalValue::Scalar(v.clone())
                } else {
                    EvalValue::Scalar(Value::Absent)
                }
            }
            SlotValue::Map(m) => {
                if keypath.is_empty() {
                    EvalValue::Map(m.clone())
                } else if let Some(v) = m.get_terminal(keypath) {
                    EvalValue::Scalar(v.clone())
                } else if let Some(level) = m.get_level(keypath) {
                    EvalValue::Map(level.clone())
                } else {
                    EvalValue::Scalar(Value::Absent)
                }
            }
        }
    }

    pub fn get_map(&self, slot: u32) -> Option<&MultiLevelMap> {
        match &self.frame().slots[slot as usize] {
            SlotValue::Map(m) => Some(m),
            SlotValue::Scalar(_) => None,
        }
    }

    /// The declared name of a slot, for diagnostics and `emit`/`dump` field
    /// labeling.
    pub fn slot_name(&self, slot: u32) -> &str {
        &self.frame().names[slot as usize]
    }

    /// Force a slot back to its empty value, bypassing the normal
    /// assignment-of-`Absent`-is-a-no-op rule. Used by `unset`.
    pub fn unset(&mut self, slot: u32) {
        let frame = self.frame_mut();
        frame.slots[slot as usize] = if frame.masks[slot as usize] == TypeMask::MAP {
            SlotValue::Map(MultiLevelMap::new())
        } else {
            SlotValue::Scalar(Value::Absent)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlr_cst::cst::SlotInfo;

    fn layout(masks: &[TypeMask]) -> FrameLayout {
        FrameLayout {
            slots: masks
                .iter()
                .enumerate()
                .map(|(i, m)| SlotInfo { name: format!("v{i}"), type_mask: *m })
                .collect(),
        }
    }

    #[test]
    fn scalar_roundtrip() {
        let mut stack = LocalStack::new();
        stack.enter_frame(&layout(&[TypeMask::INT]));
        stack.assign_scalar(0, Value::Int(5)).unwrap();
        assert!(matches!(stack.get_scalar(0), Value::Int(5)));
    }

    #[test]
    fn type_mask_violation_is_rejected() {
        let mut stack = LocalStack::new();
        stack.enter_frame(&layout(&[TypeMask::INT]));
        assert!(stack.assign_scalar(0, Value::Bool(true)).is_err());
    }

    #[test]
    fn subframe_reset_clears_slots() {
        let mut stack = LocalStack::new();
        stack.enter_frame(&layout(&[TypeMask::INT]));
        stack.assign_scalar(0, Value::Int(1)).unwrap();
        stack.enter_subframe(0, 1);
        assert!(stack.get_scalar(0).is_absent());
    }

    #[test]
    fn map_slot_keypath_assignment() {
        let mut stack = LocalStack::new();
        stack.enter_frame(&layout(&[TypeMask::MAP]));
        stack
            .assign_map(0, &[Value::String("a".into())], EvalValue::Scalar(Value::Int(1)))
            .unwrap();
        assert!(matches!(
            stack.get_map_value(0, &[Value::String("a".into())]),
            EvalValue::Scalar(Value::Int(1))
        ));
    }
}
