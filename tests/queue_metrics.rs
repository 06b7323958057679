use std::collections::HashMap;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use slopfeed::application::ai_queue::{AiPostQueue, QueuedAiPost};

fn queued(archive_id: i64) -> QueuedAiPost {
    QueuedAiPost {
        archive_id,
        title: format!("generated {archive_id}"),
        self_text: "body".to_string(),
        subreddit: None,
    }
}

#[test]
fn queue_reports_length_and_drops() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let queue = AiPostQueue::new(2);
        for id in 0..4 {
            queue.try_push(queued(id));
        }
        assert_eq!(queue.drain(1).len(), 1);
    });

    let values: HashMap<String, DebugValue> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| (composite_key.key().name().to_string(), value))
        .collect();

    match values.get("slopfeed_ai_queue_dropped_total") {
        Some(DebugValue::Counter(dropped)) => assert_eq!(*dropped, 2),
        other => panic!("unexpected dropped metric: {other:?}"),
    }
    match values.get("slopfeed_ai_queue_len") {
        Some(DebugValue::Gauge(len)) => assert_eq!(len.into_inner(), 1.0),
        other => panic!("unexpected length metric: {other:?}"),
    }
}
