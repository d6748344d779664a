use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MigrateError {
    #[error("cannot set up the {0} cluster.")]
    FatalSetup(String),
    #[error("provisioning failed: {0}")]
    Provisioning(String),
    #[error("listing failed: {0}")]
    Listing(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("not found")]
    NotFound,
}

pub fn is_not_found_error(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<MigrateError>(), Some(MigrateError::NotFound))
}
