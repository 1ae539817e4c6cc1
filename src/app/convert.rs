//! Type conversion functions for CLI to internal types.

use crate::{
    cli::Format,
    output::{OutputFormat, OutputOptions}
};

/// Converts a CLI format enum to the internal output format type.
///
/// # Example
///
/// ```
/// use sql_lineage_analyzer::{app::convert_format, cli::Format, output::OutputFormat};
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

/// Creates output options from CLI parameters.
pub fn create_output_options(format: Format, no_color: bool) -> OutputOptions {
    OutputOptions {
        format:  convert_format(format),
        colored: !no_color
    }
}
