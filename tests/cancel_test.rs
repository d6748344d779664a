#[cfg(test)]
mod common;

#[cfg(test)]
mod tests {
    use rgw_migrate::types::Headers;
    use rgw_migrate::types::token::create_pipeline_cancellation_token;

    use common::*;

    use super::*;

    const OBJECT_COUNT: usize = 1000;

    fn seed_objects(helper: &TestHelper) {
        let owner = TestHelper::generate_owner_id();
        helper.source.seed_identity(&owner, "Owner");
        helper.source.seed_container("bulk", &owner, Headers::new());
        for index in 0..OBJECT_COUNT {
            helper.source.seed_object(
                "bulk",
                &format!("{index:05}"),
                vec![1u8; 16],
                Headers::new(),
            );
        }
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new();
        seed_objects(&helper);

        let cancellation_token = create_pipeline_cancellation_token();
        cancellation_token.cancel();
        let mut pipeline = helper.pipeline_with_token(&[], cancellation_token);
        pipeline.run().await;

        assert!(!pipeline.has_error());
        assert_eq!(pipeline.get_summary().objects_attempted, 0);
        assert!(helper.target.operation_log().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_is_resumed_by_the_next_run() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new();
        seed_objects(&helper);

        let cancellation_token = create_pipeline_cancellation_token();
        let canceller = {
            let target = helper.target.clone();
            let cancellation_token = cancellation_token.clone();
            tokio::spawn(async move {
                while target.counters().objects_put < 10 {
                    tokio::task::yield_now().await;
                }
                cancellation_token.cancel();
            })
        };

        let mut pipeline = helper.pipeline_with_token(&["-j", "1"], cancellation_token);
        pipeline.run().await;
        canceller.await.unwrap();

        assert!(!pipeline.has_error());
        let transferred = helper.target.object_keys("bulk").len();
        assert!(transferred >= 10);
        assert!(transferred < OBJECT_COUNT);
        let summary = pipeline.get_summary();
        assert_eq!(summary.objects_failed, 0);
        assert_eq!(summary.objects_succeeded, transferred as u64);
        assert_eq!(helper.target.counters().objects_put, transferred as u64);

        let rerun = helper.run(&["-j", "4"]).await;

        assert!(!rerun.has_error());
        assert_eq!(
            rerun.get_summary().objects_attempted,
            (OBJECT_COUNT - transferred) as u64
        );
        assert_eq!(helper.target.object_keys("bulk").len(), OBJECT_COUNT);
    }
}
