//! Type conversion functions for CLI to internal types.
//!
//! This module provides conversion functions that translate CLI-facing
//! types (from the `cli` module) to internal domain types used by the
//! pipeline.

use crate::{
    cli::{Format, Trigger},
    output::OutputFormat,
    template::TriggerType
};

/// Converts a CLI format enum to the internal output format type.
///
/// # Example
///
/// ```
/// use sql_query_sentinel::{app::convert_format, cli::Format, output::OutputFormat};
///
/// let format = convert_format(Format::Json);
/// assert!(matches!(format, OutputFormat::Json));
/// ```
pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml
    }
}

/// Converts a CLI trigger enum to the internal trigger type.
///
/// # Example
///
/// ```
/// use sql_query_sentinel::{app::convert_trigger, cli::Trigger, template::TriggerType};
///
/// let trigger = convert_trigger(Trigger::MonthYear);
/// assert!(matches!(trigger, TriggerType::MonthYear));
/// ```
pub fn convert_trigger(trigger: Trigger) -> TriggerType {
    match trigger {
        Trigger::MonthYear => TriggerType::MonthYear,
        Trigger::Year => TriggerType::Year,
        Trigger::DateRange => TriggerType::DateRange
    }
}
