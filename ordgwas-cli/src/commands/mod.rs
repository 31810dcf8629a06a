pub mod fit_null;
pub mod scan;
