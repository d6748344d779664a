/// Shared by the walker and every transfer worker of one run. Cancelling it stops new work;
/// an object copy already in progress is allowed to finish.
pub type PipelineCancellationToken = tokio_util::sync::CancellationToken;

pub fn create_pipeline_cancellation_token() -> PipelineCancellationToken {
    PipelineCancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_cancellation() {
        let token = create_pipeline_cancellation_token();
        let worker_token = token.clone();
        assert!(!worker_token.is_cancelled());

        token.cancel();
        assert!(worker_token.is_cancelled());
    }
}
