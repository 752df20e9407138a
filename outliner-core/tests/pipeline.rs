mod common;

use std::{sync::Arc, time::Duration};

use common::*;
use outliner_core::{
    entities::LayoutLabel, save_document_record, AggregationError, DocumentOutcome,
    DocumentRecord, FailureReason, HeadingLevel, OutlineEntry, OutlineExtractor, PoolError,
};

fn annual_report_page() -> FakePage {
    FakePage::default()
        .with_text(
            LayoutLabel::Title,
            bbox(72.0, 60.0, 540.0, 110.0),
            "Annual Report",
            0.9,
        )
        .with_text(
            LayoutLabel::SectionHeader,
            bbox(72.0, 200.0, 300.0, 224.0),
            "Introduction",
            0.8,
        )
        .with_text(
            LayoutLabel::Text,
            bbox(72.0, 240.0, 540.0, 400.0),
            "This year we grew.",
            0.95,
        )
        // Not part of the outline
        .with_text(
            LayoutLabel::PageFooter,
            bbox(72.0, 740.0, 540.0, 760.0),
            "Page 1",
            0.9,
        )
}

async fn start(backend: FakeBackend, workers: usize) -> (Arc<FakeBackend>, OutlineExtractor) {
    let backend = Arc::new(backend);
    let extractor = OutlineExtractor::start(
        backend.clone(),
        test_config(workers),
        scripted_models(backend.clone(), vec![], None),
    )
    .await
    .unwrap();
    (backend, extractor)
}

#[tokio::test(flavor = "multi_thread")]
async fn single_page_title_and_heading() {
    let mut backend = FakeBackend::default();
    let doc = backend.add("report.pdf", vec![annual_report_page()]);
    let (_, extractor) = start(backend, 2).await;
    assert_eq!(extractor.healthy_workers(), 2);

    let report = extractor.run(vec![doc], |_| {}).await;

    assert!(report.aborted.is_none());
    assert!(report.failed.is_empty());
    assert_eq!(report.completed.len(), 1);
    let done = &report.completed[0];
    assert_eq!(done.doc_id, "report.pdf");
    assert_eq!(
        serde_json::to_value(&done.record).unwrap(),
        serde_json::json!({
            "title": "Annual Report",
            "outline": [{"level": "H1", "text": "Introduction", "page": 0}]
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn title_falls_back_to_first_section_header() {
    let mut backend = FakeBackend::default();
    let doc = backend.add(
        "overview.pdf",
        vec![
            FakePage::default()
                .with_text(
                    LayoutLabel::SectionHeader,
                    bbox(72.0, 80.0, 400.0, 120.0),
                    "Overview",
                    0.85,
                )
                .with_text(
                    LayoutLabel::Text,
                    bbox(72.0, 140.0, 540.0, 300.0),
                    "Some body text.",
                    0.9,
                ),
            FakePage::default().with_text(
                LayoutLabel::SectionHeader,
                bbox(72.0, 80.0, 300.0, 104.0),
                "Details",
                0.85,
            ),
        ],
    );
    let (_, extractor) = start(backend, 2).await;
    let report = extractor.run(vec![doc], |_| {}).await;

    assert_eq!(report.completed.len(), 1);
    let record = &report.completed[0].record;
    assert_eq!(record.title, "Overview");
    // The repeated title is dropped, levels stay as clustered
    assert_eq!(
        record.outline,
        vec![OutlineEntry {
            level: HeadingLevel(2),
            text: "Details".to_owned(),
            page: 1,
        }]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn scanned_title_is_recognized() {
    let mut backend = FakeBackend::default();
    let doc = backend.add(
        "scan.pdf",
        vec![FakePage::default().with_region(
            LayoutLabel::Title,
            bbox(100.0, 60.0, 500.0, 110.0),
            0.9,
        )],
    );
    let backend = Arc::new(backend);
    let extractor = OutlineExtractor::start(
        backend.clone(),
        test_config(1),
        scripted_models(
            backend.clone(),
            ocr(&[("Quarterly", 0.9), ("Results", 0.7)]),
            None,
        ),
    )
    .await
    .unwrap();

    let report = extractor.run(vec![doc], |_| {}).await;
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].record.title, "Quarterly Results");
    assert!(report.completed[0].record.outline.is_empty());
}

fn chapter_pages(prefix: &str, pages: usize) -> Vec<FakePage> {
    (0..pages)
        .map(|page| {
            let height = 40.0 - 8.0 * page as f32;
            let mut fake = FakePage::default();
            if page == 0 {
                fake = fake.with_text(
                    LayoutLabel::Title,
                    bbox(72.0, 40.0, 540.0, 90.0),
                    &format!("{prefix} Report"),
                    0.9,
                );
            }
            fake.with_text(
                LayoutLabel::SectionHeader,
                bbox(72.0, 150.0, 400.0, 150.0 + height),
                &format!("{prefix} chapter {page}"),
                0.8,
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn interleaved_documents_do_not_mix() {
    let mut backend = FakeBackend::default();
    let docs = vec![
        backend.add("alpha.pdf", chapter_pages("Alpha", 3)),
        backend.add("beta.pdf", chapter_pages("Beta", 4)),
        backend.add("gamma.pdf", chapter_pages("Gamma", 2)),
    ];
    let (_, extractor) = start(backend, 3).await;

    let mut seen = Vec::new();
    let report = extractor
        .run(docs, |outcome| {
            if let DocumentOutcome::Completed(done) = outcome {
                seen.push(done.doc_id.clone());
            }
        })
        .await;

    assert!(report.failed.is_empty());
    assert_eq!(report.completed.len(), 3);
    seen.sort();
    assert_eq!(seen, vec!["alpha.pdf", "beta.pdf", "gamma.pdf"]);

    for (doc, prefix, pages) in [
        ("alpha.pdf", "Alpha", 3),
        ("beta.pdf", "Beta", 4),
        ("gamma.pdf", "Gamma", 2),
    ] {
        let done = report
            .completed
            .iter()
            .find(|d| d.doc_id == doc)
            .unwrap();
        assert_eq!(done.record.title, format!("{prefix} Report"));
        let texts: Vec<_> = done.record.outline.iter().map(|e| e.text.clone()).collect();
        let expected: Vec<_> = (0..pages).map(|p| format!("{prefix} chapter {p}")).collect();
        assert_eq!(texts, expected);
        let pages_seen: Vec<_> = done.record.outline.iter().map(|e| e.page).collect();
        assert_eq!(pages_seen, (0..pages).collect::<Vec<_>>());
        // Tallest heading first
        assert_eq!(done.record.outline[0].level, HeadingLevel(1));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_document_is_reported() {
    let mut backend = FakeBackend::default();
    let good = backend.add("report.pdf", vec![annual_report_page()]);
    let broken = outliner_core::InputDocument::new("broken.pdf", "/fixtures/missing/broken.pdf");
    let (_, extractor) = start(backend, 2).await;

    let report = extractor.run(vec![broken, good], |_| {}).await;

    assert!(report.aborted.is_none());
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].doc_id, "report.pdf");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].doc_id, "broken.pdf");
    assert!(matches!(
        report.failed[0].reason,
        FailureReason::Unreadable(_)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn unsplittable_page_counts_as_empty() {
    let mut backend = FakeBackend::default();
    let mut broken_page = FakePage::default().with_text(
        LayoutLabel::SectionHeader,
        bbox(72.0, 200.0, 300.0, 224.0),
        "Lost",
        0.9,
    );
    broken_page.fail_split = true;
    let doc = backend.add("partial.pdf", vec![annual_report_page(), broken_page]);
    let (_, extractor) = start(backend, 2).await;

    let report = extractor.run(vec![doc], |_| {}).await;

    assert!(report.failed.is_empty());
    let record = &report.completed[0].record;
    assert_eq!(record.title, "Annual Report");
    assert_eq!(record.outline.len(), 1);
    assert_eq!(record.outline[0].text, "Introduction");
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_page_document_gets_an_empty_record() {
    let mut backend = FakeBackend::default();
    let doc = backend.add("blank.pdf", vec![]);
    let (_, extractor) = start(backend, 1).await;

    let report = extractor.run(vec![doc], |_| {}).await;
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].record, DocumentRecord::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn no_documents_is_a_clean_run() {
    let (_, extractor) = start(FakeBackend::default(), 2).await;
    let report = extractor.run(vec![], |_| {}).await;
    assert!(report.completed.is_empty());
    assert!(report.failed.is_empty());
    assert!(report.aborted.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_refuses_to_start_without_healthy_workers() {
    let backend = Arc::new(FakeBackend::default());
    let result = OutlineExtractor::start(backend, test_config(3), |id| {
        anyhow::bail!("model file missing for worker {id}")
    })
    .await;

    match result {
        Err(PoolError::NoHealthyWorker { failures }) => {
            assert_eq!(failures.len(), 3);
            assert!(failures[0].message.contains("model file missing"));
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("pool started without models"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn partially_failed_pool_still_processes() {
    let mut backend = FakeBackend::default();
    let docs = vec![
        backend.add("alpha.pdf", chapter_pages("Alpha", 3)),
        backend.add("beta.pdf", chapter_pages("Beta", 2)),
    ];
    let backend = Arc::new(backend);
    let load = scripted_models(backend.clone(), vec![], None);
    let extractor = OutlineExtractor::start(backend.clone(), test_config(3), move |id| {
        if id == 0 {
            anyhow::bail!("out of memory");
        }
        load(id)
    })
    .await
    .unwrap();
    assert_eq!(extractor.healthy_workers(), 2);

    let report = extractor.run(docs, |_| {}).await;
    assert_eq!(report.completed.len(), 2);
    assert!(report.failed.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_pipeline_abandons_open_documents() {
    let mut backend = FakeBackend::default();
    let docs = vec![
        backend.add("slow.pdf", vec![annual_report_page()]),
        backend.add("later.pdf", chapter_pages("Later", 2)),
    ];
    let backend = Arc::new(backend);
    let mut config = test_config(1);
    config.result_timeout = Duration::from_millis(200);
    let extractor = OutlineExtractor::start(
        backend.clone(),
        config,
        scripted_models(backend.clone(), vec![], Some(Duration::from_millis(1500))),
    )
    .await
    .unwrap();

    let report = extractor.run(docs, |_| {}).await;

    assert_eq!(
        report.aborted,
        Some(AggregationError::Timeout(Duration::from_millis(200)))
    );
    assert!(report.completed.is_empty());
    // Every input is still accounted for
    let mut failed: Vec<_> = report.failed.iter().map(|f| f.doc_id.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["later.pdf", "slow.pdf"]);
    let slow = report
        .failed
        .iter()
        .find(|f| f.doc_id == "slow.pdf")
        .unwrap();
    assert_eq!(
        slow.reason,
        FailureReason::Abandoned {
            received: 0,
            expected: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn records_are_written_as_they_complete() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = FakeBackend::default();
    let docs = vec![
        backend.add("report.pdf", vec![annual_report_page()]),
        backend.add("alpha.pdf", chapter_pages("Alpha", 2)),
    ];
    let (_, extractor) = start(backend, 2).await;

    let mut written = Vec::new();
    let report = extractor
        .run(docs, |outcome| {
            if let DocumentOutcome::Completed(done) = outcome {
                let path = save_document_record(&done.record, dir.path(), &done.doc_id).unwrap();
                written.push(path);
            }
        })
        .await;
    assert_eq!(report.completed.len(), 2);
    assert_eq!(written.len(), 2);

    let content = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
    let record: DocumentRecord = serde_json::from_str(&content).unwrap();
    assert_eq!(record.title, "Annual Report");
    assert!(content.ends_with("}\n"));
    assert!(dir.path().join("alpha.json").exists());
}
