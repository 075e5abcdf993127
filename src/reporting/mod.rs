pub mod artifact;
pub mod sarif;

pub use artifact::{read_full_scan, write_full_scan, FullScanArtifact};
pub use sarif::{import_run, to_sarif};
