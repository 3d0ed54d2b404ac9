//! Core library for the payroll-combine command line application.
//!
//! The library turns a payroll workbook exported from a field-service
//! business system into a consolidated report workbook: one sheet per
//! technician plus an "All Technicians" master sheet whose rows reference
//! the detail sheets live. The modules keep responsibilities narrow and
//! composable: reading and writing adapters live under [`io`], typed
//! records in [`model`], the customer-name resolution table in [`lookup`],
//! report assembly in [`report`], the PDF gateway contract in [`export`],
//! and the run orchestration in [`run`].

pub mod error;
pub mod events;
pub mod export;
pub mod group;
pub mod io;
pub mod lookup;
pub mod model;
pub mod report;
pub mod run;

pub use error::{ReportError, Result};
