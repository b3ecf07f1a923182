pub mod consultant;
pub mod prescription;
pub mod report_extractor;
pub mod symptom;

#[cfg(test)]
pub(crate) mod testing;

pub use consultant::{PatientConsultant, PatientProfile};
pub use prescription::PrescriptionReader;
pub use report_extractor::ReportExtractor;
pub use symptom::SymptomAdvisor;
