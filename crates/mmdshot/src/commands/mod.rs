//! CLI command implementations.

pub(crate) mod run;
pub(crate) mod validate;

pub(crate) use run::RunArgs;
pub(crate) use validate::ValidateArgs;
