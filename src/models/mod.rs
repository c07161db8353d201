//! Data models for the sponsorship administration application.
//!
//! Field names serialize as camelCase to match the browser client.

mod academic_year;
mod audit;
mod dashboard;
mod exam;
mod profile;
mod records;
mod revision;
mod settings;
mod sponsor;
mod student;

pub use academic_year::*;
pub use audit::*;
pub use dashboard::*;
pub use exam::*;
pub use profile::*;
pub use records::*;
pub use revision::*;
pub use settings::*;
pub use sponsor::*;
pub use student::*;
