pub mod excel_scanner;
pub mod grouping;
pub mod normalizer;
