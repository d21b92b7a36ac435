use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlipError {
    #[error("A meridian flip is already in progress")]
    FlipInProgress,

    #[error("Cannot determine target coordinates for flip")]
    NoTargetCoordinates,

    #[error("Flip slew failed")]
    Slew(#[source] anyhow::Error),

    #[error("Meridian flip cancelled")]
    Cancelled,
}

impl FlipError {
    /// Message plus every cause, joined with ": "
    pub fn detail(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
