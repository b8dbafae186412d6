// src/extractors/mod.rs
pub mod fiscal_year;
pub mod normalize;
pub mod section;
pub mod structured;
pub mod table;

// Re-export key extraction types for convenience
pub use fiscal_year::resolve_fiscal_year;
pub use section::{ExtractedSection, SectionExtractor};
pub use table::{StatementCategory, TableExtractor};
