//! End-to-end pipeline tests against an in-memory sink

mod common;

use common::{ndjson_file, scan_line, Insert, RecordingSink};
use scanhouse_ingest::{
    IngestError, MalformedLinePolicy, Pipeline, PipelineOptions, PipelineState, ScanMode,
    SinkError, WritePolicy,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn options(mode: ScanMode, batch_size: usize) -> PipelineOptions {
    PipelineOptions {
        mode,
        batch_size,
        ..Default::default()
    }
}

async fn run(
    options: PipelineOptions,
    sink: &Arc<RecordingSink>,
    path: &Path,
) -> scanhouse_ingest::Result<scanhouse_ingest::PipelineStats> {
    let mut pipeline = Pipeline::new(options).unwrap();
    let connect = {
        let sink = Arc::clone(sink);
        async move { Ok::<_, SinkError>(sink) }
    };
    pipeline.run_file(connect, path).await
}

#[tokio::test]
async fn test_line_without_products() {
    let file = ndjson_file([r#"{"ip":"1.2.3.4","port":80,"timestamp":1000,"protocol":"tcp"}"#]);
    let sink = Arc::new(RecordingSink::new());

    let stats = run(options(ScanMode::Extended, 10), &sink, file.path())
        .await
        .unwrap();

    let scans = sink.scans();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].scan_id, "1.2.3.4_80_1000");
    assert!(!scans[0].tls_enabled);
    assert_eq!(scans[0].product_count, 0);
    assert!(scans[0].product_services.is_empty());
    assert_eq!(sink.product_calls(), 0);
    assert_eq!(stats.product_rows, 0);
}

#[tokio::test]
async fn test_line_without_products_in_short_mode() {
    let file = ndjson_file([r#"{"ip":"1.2.3.4","port":80,"timestamp":1000,"protocol":"tcp"}"#]);
    let sink = Arc::new(RecordingSink::new());

    let stats = run(options(ScanMode::Short, 10), &sink, file.path())
        .await
        .unwrap();

    let scans = sink.scans();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].scan_id, "1.2.3.4_80_1000");
    assert_eq!(scans[0].product_count, 0);
    assert!(scans[0].product_services.is_empty());
    assert_eq!(sink.product_calls(), 0);
    assert_eq!(stats.product_rows, 0);
}

#[tokio::test]
async fn test_line_with_products() {
    let file = ndjson_file([
        r#"{"ip":"1.2.3.4","port":80,"timestamp":1000,"products":[{"service":"http","softmatch":1},{"service":"http"},{"probe":"x"}]}"#,
    ]);
    let sink = Arc::new(RecordingSink::new());

    let stats = run(options(ScanMode::Extended, 10), &sink, file.path())
        .await
        .unwrap();

    let scan = &sink.scans()[0];
    assert_eq!(scan.product_count, 3);
    assert_eq!(scan.product_services.iter().collect::<Vec<_>>(), vec!["http"]);

    let products = sink.products();
    assert_eq!(products.len(), 3);
    assert_eq!(
        products.iter().map(|p| p.softmatch).collect::<Vec<_>>(),
        vec![1, 0, 0]
    );
    assert!(products.iter().all(|p| p.scan_id == "1.2.3.4_80_1000"));
    assert_eq!(stats.product_rows, 3);

    // scan rows go first
    assert!(matches!(sink.calls()[0], Insert::Scans(_)));
    assert!(matches!(sink.calls()[1], Insert::Products(_)));
}

#[tokio::test]
async fn test_short_mode_batches() {
    let file = ndjson_file((0..25_000).map(scan_line));
    let sink = Arc::new(RecordingSink::new());

    let stats = run(options(ScanMode::Short, 10_000), &sink, file.path())
        .await
        .unwrap();

    assert_eq!(sink.scan_batch_sizes(), vec![10_000, 10_000, 5_000]);
    assert_eq!(sink.product_calls(), 0);
    assert_eq!(stats.lines_processed, 25_000);
    assert_eq!(stats.batches_written, 3);

    // counts are kept in short mode
    assert!(sink.scans().iter().all(|s| s.product_count == 1));
}

#[tokio::test]
async fn test_exact_batch_size_writes_once() {
    let file = ndjson_file((0..50).map(scan_line));
    let sink = Arc::new(RecordingSink::new());

    let stats = run(options(ScanMode::Short, 50), &sink, file.path())
        .await
        .unwrap();

    assert_eq!(sink.scan_batch_sizes(), vec![50]);
    assert_eq!(stats.batches_written, 1);
}

#[tokio::test]
#[traced_test]
async fn test_failed_batch_does_not_stop_the_run() {
    let file = ndjson_file((0..5).map(scan_line));
    let sink = Arc::new(RecordingSink::failing_scan_calls(&[1]));

    let stats = run(options(ScanMode::Extended, 2), &sink, file.path())
        .await
        .unwrap();

    assert_eq!(sink.scan_batch_sizes(), vec![2, 2, 1]);
    // products of the failed batch are never sent
    assert_eq!(sink.product_calls(), 2);
    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(stats.batches_written, 2);
    assert!(logs_contain("Batch insert failed"));
    assert!(logs_contain("scan insert 1 refused"));
}

#[tokio::test]
#[traced_test]
async fn test_always_failing_sink_is_contained() {
    let file = ndjson_file((0..7).map(scan_line));
    let sink = Arc::new(RecordingSink::always_failing());

    let stats = run(options(ScanMode::Extended, 3), &sink, file.path())
        .await
        .unwrap();

    assert_eq!(sink.scan_batch_sizes(), vec![3, 3, 1]);
    assert_eq!(stats.batches_dropped, 3);
    assert_eq!(stats.batches_written, 0);
    assert!(logs_contain("Batch insert failed"));
}

#[tokio::test]
async fn test_fail_fast_stops_on_first_failure() {
    let file = ndjson_file((0..7).map(scan_line));
    let sink = Arc::new(RecordingSink::always_failing());
    let options = PipelineOptions {
        write_policy: WritePolicy::FailFast,
        ..options(ScanMode::Extended, 3)
    };

    let err = run(options, &sink, file.path()).await.unwrap_err();

    assert!(matches!(err, IngestError::StoreWrite { rows: 3, .. }));
    assert_eq!(sink.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_recovers() {
    let file = ndjson_file((0..4).map(scan_line));
    let sink = Arc::new(RecordingSink::failing_scan_calls(&[1]));
    let options = PipelineOptions {
        write_policy: WritePolicy::Retry {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
        },
        ..options(ScanMode::Short, 4)
    };

    let stats = run(options, &sink, file.path()).await.unwrap();

    assert_eq!(sink.scan_batch_sizes(), vec![4, 4]);
    assert_eq!(stats.batches_written, 1);
    assert_eq!(stats.batches_dropped, 0);
}

#[tokio::test]
async fn test_blank_lines_are_counted_not_decoded() {
    let lines: Vec<String> = (0..30)
        .map(|i| if i % 3 == 2 { "   ".to_string() } else { scan_line(i) })
        .collect();
    let file = ndjson_file(&lines);
    let sink = Arc::new(RecordingSink::new());

    let stats = run(options(ScanMode::Short, 100), &sink, file.path())
        .await
        .unwrap();

    assert_eq!(stats.lines_processed, 30);
    assert_eq!(stats.records_decoded, 20);
    assert_eq!(sink.scans().len(), 20);
}

#[tokio::test]
async fn test_malformed_line_aborts_by_default() {
    let file = ndjson_file([scan_line(0), "{not json".to_string(), scan_line(1)]);
    let sink = Arc::new(RecordingSink::new());

    let err = run(options(ScanMode::Extended, 10), &sink, file.path())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Decode { line: 2, .. }));
    assert!(sink.calls().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_malformed_line_skip_policy() {
    let file = ndjson_file([scan_line(0), "[1,2]".to_string(), scan_line(1)]);
    let sink = Arc::new(RecordingSink::new());
    let options = PipelineOptions {
        on_malformed_line: MalformedLinePolicy::Skip,
        ..options(ScanMode::Short, 10)
    };

    let stats = run(options, &sink, file.path()).await.unwrap();

    assert_eq!(stats.lines_processed, 3);
    assert_eq!(stats.malformed_skipped, 1);
    assert_eq!(sink.scans().len(), 2);
    assert!(logs_contain("Skipping malformed line"));
}

#[tokio::test]
async fn test_connect_failure_is_fatal() {
    let file = ndjson_file([scan_line(0)]);
    let mut pipeline = Pipeline::new(PipelineOptions::default()).unwrap();

    let connect = async { Err::<Arc<RecordingSink>, _>(SinkError::Rejected("down".to_string())) };
    let err = pipeline.run_file(connect, file.path()).await.unwrap_err();

    assert!(matches!(err, IngestError::StoreConnect(_)));
    assert_eq!(pipeline.state(), PipelineState::Connecting);
}

#[tokio::test]
async fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::new());

    let err = run(PipelineOptions::default(), &sink, &dir.path().join("missing.json"))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Input { .. }));
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_utf8_is_a_read_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"{\"ip\":\"1.1.1.1\"}\n\xff\xfe\n").unwrap();
    let sink = Arc::new(RecordingSink::new());

    let err = run(PipelineOptions::default(), &sink, file.path())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Read { line: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_flushes_buffered_rows() {
    let (mut input, output) = tokio::io::duplex(64 * 1024);
    for i in 0..3 {
        input.write_all(format!("{}\n", scan_line(i)).as_bytes()).await.unwrap();
    }

    let sink = Arc::new(RecordingSink::new());
    let token = CancellationToken::new();
    let mut pipeline = Pipeline::new(options(ScanMode::Extended, 100))
        .unwrap()
        .with_shutdown(token.clone());

    let task = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            let stats = pipeline.run_reader(sink, BufReader::new(output)).await;
            (stats, pipeline.state())
        })
    };

    // the reader is idle once all three lines are consumed
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let (stats, state) = task.await.unwrap();
    let stats = stats.unwrap();

    assert!(stats.cancelled);
    assert_eq!(stats.lines_processed, 3);
    assert_eq!(sink.scan_batch_sizes(), vec![3]);
    assert_eq!(sink.products().len(), 3);
    assert_eq!(state, PipelineState::Finished);
    drop(input);
}

#[tokio::test]
#[traced_test]
async fn test_progress_and_summary_logs() {
    let file = ndjson_file([
        scan_line(0),
        scan_line(1),
        "   ".to_string(),
        scan_line(2),
        scan_line(3),
    ]);
    let sink = Arc::new(RecordingSink::new());
    let options = PipelineOptions {
        progress_interval: 2,
        ..options(ScanMode::Short, 10)
    };

    let stats = run(options, &sink, file.path()).await.unwrap();
    assert_eq!(stats.lines_processed, 5);
    assert_eq!(stats.records_decoded, 4);

    logs_assert(|lines: &[&str]| {
        let progress: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|line| line.contains("Processed lines"))
            .collect();
        if progress.len() != 2 {
            return Err(format!("expected 2 progress lines, got {:?}", progress));
        }
        if !progress[0].contains("lines=2") || !progress[1].contains("lines=4") {
            return Err(format!("unexpected progress counts: {:?}", progress));
        }
        if !progress
            .iter()
            .all(|line| line.contains("interval_secs=") && line.contains("total_secs="))
        {
            return Err(format!("progress lines lack timings: {:?}", progress));
        }

        let summary: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|line| line.contains("Ingestion finished"))
            .collect();
        match summary.as_slice() {
            [line] if line.contains("lines=5") && line.contains("records=4") => Ok(()),
            other => Err(format!("unexpected summary: {:?}", other)),
        }
    });
}
