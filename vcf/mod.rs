pub mod filter;
pub mod genotype;
pub mod population;
pub mod stream;

pub use filter::{Filtered, IdentifierFilter, IndividualsFilter, RecordAction, RecordFilter};
pub use genotype::{DosageCache, dosage};
pub use population::{Population, PopulationError};
pub use stream::{RecordStream, VariantRecord, VcfError, VcfStream};
