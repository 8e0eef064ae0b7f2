// Job pipeline: OCR check, capture, dedup, OCR, report

pub mod browser;
pub mod capture;
pub mod dedup;
pub mod ocr;
pub mod ocr_check;
pub mod orchestrator;
pub mod report;
pub mod types;
