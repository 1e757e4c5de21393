//! Ready-made hooks for common training chores.
//!
//! - [`StopTrainingHook`] - stops training at a fixed point
//! - [`ValueReporter`] - logs registry values in the background
//! - [`NumberAccumulator`] / [`AccumulatedValueReporter`] - running means of
//!   numeric values between reports
//! - [`EarlyStopping`] - stops when a metric stops improving
//! - [`SetValueCommand`] - writes a registry value once

mod accumulate;
mod early_stopping;
mod report;
mod set_value;
mod stop;

pub use accumulate::{
    ACCUMULATOR_ROOT, AccumulatedValueReporter, Accumulated, MeanSink, NumberAccumulator,
    accumulator_path,
};
pub use early_stopping::{EarlyStopping, StopMode};
pub use report::{ValueReporter, ValueSink};
pub use set_value::SetValueCommand;
pub use stop::StopTrainingHook;

use cadence_registry::{Parameter, RegistryError};

use crate::context::HookContext;
use crate::error::HookError;

/// Reads a registry value as `f64`, accepting any primitive numeric type.
pub(crate) fn read_number(ctx: &HookContext<'_>, path: &str) -> Result<f64, HookError> {
    let value = ctx.registry().get_parameter(path)?;
    as_number(value).ok_or_else(|| {
        HookError::Registry(RegistryError::TypeMismatch {
            path: path.to_string(),
            expected: "number",
            found: value.parameter_type_name(),
        })
    })
}

fn as_number(value: &dyn Parameter) -> Option<f64> {
    if let Some(value) = value.downcast_ref::<f64>() {
        return Some(*value);
    }
    if let Some(value) = value.downcast_ref::<f32>() {
        return Some(f64::from(*value));
    }
    if let Some(value) = value.downcast_ref::<i32>() {
        return Some(f64::from(*value));
    }
    if let Some(value) = value.downcast_ref::<u32>() {
        return Some(f64::from(*value));
    }
    if let Some(value) = value.downcast_ref::<i64>() {
        return Some(*value as f64);
    }
    if let Some(value) = value.downcast_ref::<u64>() {
        return Some(*value as f64);
    }
    value.downcast_ref::<usize>().map(|value| *value as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_of_every_width_are_read() {
        let values: [Box<dyn Parameter>; 7] = [
            Box::new(1.5_f64),
            Box::new(1.5_f32),
            Box::new(-2_i32),
            Box::new(2_u32),
            Box::new(-3_i64),
            Box::new(3_u64),
            Box::new(4_usize),
        ];
        let read: Vec<f64> = values.iter().filter_map(|value| as_number(&**value)).collect();
        assert_eq!(read, vec![1.5, 1.5, -2.0, 2.0, -3.0, 3.0, 4.0]);
    }

    #[test]
    fn non_numbers_are_rejected() {
        assert_eq!(as_number(&String::from("1.0")), None);
    }
}
