//! Parameter binding (Component B).
//!
//! A `ClientCommandParameter` starts empty at prepare time with metadata
//! supplied by the server, gets bound by the caller before each execute, and
//! reports type/precision/scale from the bound value when present, else from
//! metadata (`nullable` always comes from metadata, §4.3).

use crate::errors::{Error, ParameterError};
use crate::value::Value;

/// Server-reported type metadata for one bind position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterMetadata {
    pub data_type: i32,
    pub precision: i64,
    pub scale: i32,
    pub nullable: bool,
}

/// One bound/bindable parameter of a prepared `ClientCommand`.
#[derive(Debug, Clone)]
pub struct ClientCommandParameter {
    /// 1-based wire index, reported in `ParameterError::NotSet`.
    pub index: usize,
    value: Option<Value>,
    metadata: ParameterMetadata,
}

impl ClientCommandParameter {
    /// Created empty during prepare; `metadata` comes from the server.
    pub fn new(index: usize, metadata: ParameterMetadata) -> Self {
        ClientCommandParameter {
            index,
            value: None,
            metadata,
        }
    }

    /// Binds a new value. `close_old=true` always replaces; `close_old=false`
    /// only succeeds if the parameter is currently unset, mirroring the
    /// source's "close the previous value iff closeOld" contract: rebinding
    /// over a still-bound value without closing it first is rejected rather
    /// than silently dropping whatever the previous value held (a held
    /// `Value::Bytes`/`Value::Str` may back an external resource the caller
    /// is expected to close explicitly before rebinding without `close_old`).
    pub fn set_value(&mut self, value: Value, close_old: bool) -> Result<(), Error> {
        if self.value.is_some() && !close_old {
            return Err(ParameterError::PreviousValueNotClosed { index: self.index }.into());
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Fails with `ParameterError::NotSet(index)` if the caller never bound
    /// this parameter before an execute.
    pub fn check_set(&self) -> Result<(), Error> {
        if self.value.is_none() {
            return Err(ParameterError::NotSet { index: self.index }.into());
        }
        Ok(())
    }

    /// Type is reported from the bound value when present, else from the
    /// server metadata.
    pub fn data_type(&self) -> i32 {
        match &self.value {
            Some(Value::Null) | None => self.metadata.data_type,
            Some(v) => value_data_type_hint(v).unwrap_or(self.metadata.data_type),
        }
    }

    pub fn precision(&self) -> i64 {
        self.metadata.precision
    }

    pub fn scale(&self) -> i32 {
        self.metadata.scale
    }

    /// Always sourced from metadata, never from the bound value.
    pub fn nullable(&self) -> bool {
        self.metadata.nullable
    }

    pub fn metadata(&self) -> ParameterMetadata {
        self.metadata
    }

    /// Drops the bound value, leaving the parameter ready for reuse. Called
    /// by `ClientCommand::close` for every parameter in declaration order.
    pub fn close(&mut self) {
        self.value = None;
    }
}

fn value_data_type_hint(v: &Value) -> Option<i32> {
    // Mirrors a small ad-hoc type-code table; real type discovery belongs to
    // the (external) SQL parser/execution engine, not this crate.
    match v {
        Value::Bool(_) => Some(1),
        Value::Int(_) => Some(2),
        Value::Double(_) => Some(3),
        Value::Bytes(_) => Some(4),
        Value::Str(_) => Some(5),
        Value::Uuid(_) => Some(6),
        Value::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_set_fails_until_bound() {
        let p = ClientCommandParameter::new(3, ParameterMetadata::default());
        let err = p.check_set().unwrap_err();
        match err {
            Error::Parameter(ParameterError::NotSet { index }) => assert_eq!(index, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn set_value_then_check_set_succeeds() {
        let mut p = ClientCommandParameter::new(1, ParameterMetadata::default());
        p.set_value(Value::Int(5), true).unwrap();
        assert!(p.check_set().is_ok());
        assert_eq!(p.value(), Some(&Value::Int(5)));
    }

    #[test]
    fn nullable_always_comes_from_metadata() {
        let meta = ParameterMetadata {
            nullable: true,
            ..Default::default()
        };
        let mut p = ClientCommandParameter::new(1, meta);
        p.set_value(Value::Int(1), false).unwrap();
        assert!(p.nullable());
    }

    #[test]
    fn close_drops_bound_value() {
        let mut p = ClientCommandParameter::new(1, ParameterMetadata::default());
        p.set_value(Value::Int(1), false).unwrap();
        p.close();
        assert!(p.check_set().is_err());
    }

    #[test]
    fn rebinding_without_close_old_is_rejected() {
        let mut p = ClientCommandParameter::new(4, ParameterMetadata::default());
        p.set_value(Value::Int(1), false).unwrap();
        let err = p.set_value(Value::Int(2), false).unwrap_err();
        match err {
            Error::Parameter(ParameterError::PreviousValueNotClosed { index }) => assert_eq!(index, 4),
            other => panic!("unexpected error: {other:?}"),
        }
        // Original value untouched by the rejected rebind.
        assert_eq!(p.value(), Some(&Value::Int(1)));
    }

    #[test]
    fn close_old_true_rebinds_over_an_existing_value() {
        let mut p = ClientCommandParameter::new(1, ParameterMetadata::default());
        p.set_value(Value::Int(1), false).unwrap();
        p.set_value(Value::Int(2), true).unwrap();
        assert_eq!(p.value(), Some(&Value::Int(2)));
    }
}
