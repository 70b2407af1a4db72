pub mod grading;
pub mod extraction;
pub mod structuring;
pub mod processor;
pub mod diagnostic; // Intermediate dumps (BOLETIM_DUMP_DIR)
