pub mod filename;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod template;
pub(crate) mod util;
pub mod workbook;

pub use filename::{FilenameMeta, FilenamePattern, FilenamePatternError, DEFAULT_FILENAME_PATTERN};
pub use normalize::{
    canonical_machine_name, normalize, normalize_hits, split_revision, NormalizedSheet, RowError,
    RowErrorKind, SheetMeta,
};
pub use pipeline::{FileIngest, SheetPipeline, SheetSummary};
pub use schema::{resolve, FieldBinding, ResolutionStrategy, SchemaError};
pub use util::{levenshtein_distance, parse_decimal, similarity};
pub use template::{fields, FieldLocation, FieldSpec, FixedLayout, SheetTemplate, TemplateError};
pub use workbook::{CellValue, LoadError, RawGrid, Workbook};

pub mod import {
    use crate::*;
    use pressline_core::SourceFamily;

    pub fn default_pipeline(family: SourceFamily) -> SheetPipeline {
        SheetPipeline::new(SheetTemplate::default_for(family), FilenamePattern::default())
    }

    pub fn create_pipeline(
        template: SheetTemplate,
        filename_pattern: Option<&str>,
    ) -> Result<SheetPipeline, FilenamePatternError> {
        let pattern = match filename_pattern {
            Some(p) => FilenamePattern::new(p)?,
            None => FilenamePattern::default(),
        };
        Ok(SheetPipeline::new(template, pattern))
    }
}
