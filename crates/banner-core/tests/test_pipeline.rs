//! End-to-end pipeline tests with a mocked image provider
//!
//! Exercises the full job lifecycle (submit, generate, review, edit,
//! approve, download, cancel, sweep) without touching any real API.

use async_trait::async_trait;
use banner_core::config::BannerConfig;
use banner_core::{
    ArtifactKey, ArtifactStore, BannerError, BannerRequest, BannerService, ImageProvider, JobId,
    JobStatus, LetterSpec, Palette, PaletteCatalog, ProviderImage, ProviderRegistry,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn png_bytes(edge: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(edge, edge, Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[derive(Default)]
struct MockProvider {
    /// Glyph whose generation call fails, if any
    fail_on_glyph: Option<char>,
    fail_edits: bool,
    generate_delay_ms: u64,
    edit_delay_ms: u64,
    active: AtomicUsize,
    max_active: AtomicUsize,
    generate_calls: AtomicUsize,
}

#[async_trait]
impl ImageProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        glyph: char,
        theme: &str,
        _palette: &Palette,
    ) -> banner_core::Result<ProviderImage> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.generate_calls.fetch_add(1, Ordering::SeqCst);

        if self.generate_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.generate_delay_ms)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on_glyph == Some(glyph) {
            return Err(BannerError::Adapter(format!(
                "Refusing to draw '{}'",
                glyph
            )));
        }

        // Deterministic per (glyph, theme) so tests can compare artifacts
        let shade = (glyph as u8).wrapping_add(theme.len() as u8);
        Ok(ProviderImage {
            bytes: png_bytes(8, [shade, 64, 128, 255]),
            content_type: "image/png".to_string(),
            cost_usd: 0.01,
        })
    }

    async fn edit(
        &self,
        _image: &[u8],
        _content_type: &str,
        instruction: &str,
    ) -> banner_core::Result<ProviderImage> {
        if self.edit_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.edit_delay_ms)).await;
        }
        if self.fail_edits {
            return Err(BannerError::Adapter("Edit rejected".to_string()));
        }
        let shade = instruction.len() as u8;
        Ok(ProviderImage {
            bytes: png_bytes(4, [shade, 200, 10, 255]),
            content_type: "image/png".to_string(),
            cost_usd: 0.02,
        })
    }

    async fn suggest_themes(
        &self,
        name: &str,
        theme: &str,
    ) -> banner_core::Result<Vec<LetterSpec>> {
        Ok(name
            .chars()
            .enumerate()
            .map(|(i, c)| {
                LetterSpec::new(c.to_ascii_uppercase(), format!("{} motif {}", theme, i + 1))
            })
            .collect())
    }
}

struct Fixture {
    service: BannerService,
    provider: Arc<MockProvider>,
    _dir: TempDir,
}

fn fixture_with(mock: MockProvider, tune: impl FnOnce(&mut BannerConfig)) -> Fixture {
    let mut config = BannerConfig::default();
    config.jobs.concurrent_generations = 2;
    tune(&mut config);

    let dir = TempDir::new().unwrap();
    let artifacts = ArtifactStore::new(dir.path()).unwrap();
    let provider = Arc::new(mock);
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone());

    let service = BannerService::new(&config, registry, PaletteCatalog::builtin(), artifacts);
    Fixture {
        service,
        provider,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(MockProvider::default(), |_| {})
}

fn lola_request() -> BannerRequest {
    BannerRequest {
        name: "Lola".to_string(),
        letters: vec![
            LetterSpec::new('L', "lighthouse"),
            LetterSpec::new('O', "octopus"),
            LetterSpec::new('L', "seashell"),
            LetterSpec::new('A', "anchor"),
        ],
        color_palette: "ocean_breeze".to_string(),
        provider: "mock".to_string(),
    }
}

async fn wait_for(service: &BannerService, id: JobId, wanted: JobStatus) -> JobStatus {
    for _ in 0..200 {
        let report = service.status(id).await.unwrap();
        if report.status == wanted || report.status.is_terminal() {
            return report.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Job {} never reached {:?}", id, wanted);
}

#[tokio::test]
async fn test_full_pipeline_to_completion() {
    let fx = fixture();
    let id = fx.service.submit(lola_request()).await.unwrap();

    assert_eq!(
        wait_for(&fx.service, id, JobStatus::ReadyForReview).await,
        JobStatus::ReadyForReview
    );

    let report = fx.service.status(id).await.unwrap();
    assert_eq!(report.progress, 100);
    assert_eq!(report.completed_letters, 4);
    assert_eq!(report.total_letters, 4);
    assert!(report.files.contains_key("letter_0"));
    assert!(report.files.contains_key("letter_3"));
    assert!(!report.files.contains_key("banner"));
    assert_eq!(report.cost_info.generation_calls, 4);

    let report = fx.service.approve(id).await.unwrap();
    assert_eq!(report.status, JobStatus::Completed);
    assert!(report.files.contains_key("banner"));
    assert!(report.files.contains_key("document"));

    let (banner, content_type) = fx.service.download(id, &ArtifactKey::Banner).await.unwrap();
    assert_eq!(content_type, "image/png");
    assert!(banner.starts_with(&[0x89, b'P', b'N', b'G']));

    let (document, content_type) = fx
        .service
        .download(id, &ArtifactKey::Document)
        .await
        .unwrap();
    assert_eq!(content_type, "application/pdf");
    assert!(document.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_duplicate_glyphs_are_independent_units() {
    let fx = fixture();
    let id = fx.service.submit(lola_request()).await.unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;

    // Both L's exist as separate artifacts; different themes, different bytes
    let (first_l, _) = fx
        .service
        .download(id, &ArtifactKey::Letter(0))
        .await
        .unwrap();
    let (second_l, _) = fx
        .service
        .download(id, &ArtifactKey::Letter(2))
        .await
        .unwrap();
    assert_ne!(first_l, second_l);
    assert_eq!(fx.provider.generate_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_adapter_failure_fails_job_without_outputs() {
    let fx = fixture_with(
        MockProvider {
            fail_on_glyph: Some('O'),
            ..Default::default()
        },
        |_| {},
    );
    let id = fx.service.submit(lola_request()).await.unwrap();

    assert_eq!(
        wait_for(&fx.service, id, JobStatus::Failed).await,
        JobStatus::Failed
    );
    let report = fx.service.status(id).await.unwrap();
    assert!(report.error_message.unwrap().contains("Letter 2"));
    assert!(!report.files.contains_key("banner"));
    assert!(!report.files.contains_key("document"));
    // Letter 1 finished before the failure and is still recorded
    assert!(report.files.contains_key("letter_0"));

    // A failed job cannot be approved or edited
    assert!(matches!(
        fx.service.approve(id).await,
        Err(BannerError::Validation(_))
    ));
    assert!(matches!(
        fx.service.edit_letter(id, 0, "brighter").await,
        Err(BannerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_adapter_timeout_fails_job() {
    let fx = fixture_with(
        MockProvider {
            generate_delay_ms: 1500,
            ..Default::default()
        },
        |c| c.jobs.adapter_timeout_secs = 1,
    );
    let id = fx.service.submit(lola_request()).await.unwrap();

    assert_eq!(
        wait_for(&fx.service, id, JobStatus::Failed).await,
        JobStatus::Failed
    );
    let report = fx.service.status(id).await.unwrap();
    assert!(report.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_edit_replaces_only_target_letter() {
    let fx = fixture();
    let id = fx.service.submit(lola_request()).await.unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;

    let mut before = Vec::new();
    for i in 0..4 {
        let (bytes, _) = fx
            .service
            .download(id, &ArtifactKey::Letter(i))
            .await
            .unwrap();
        before.push(bytes);
    }

    let report = fx
        .service
        .edit_letter(id, 1, "make the octopus purple")
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::ReadyForReview);
    assert_eq!(report.progress, 100);
    assert_eq!(report.cost_info.edit_calls, 1);

    for i in 0..4 {
        let (bytes, _) = fx
            .service
            .download(id, &ArtifactKey::Letter(i))
            .await
            .unwrap();
        if i == 1 {
            assert_ne!(bytes, before[i], "edited letter must change");
        } else {
            assert_eq!(bytes, before[i], "untouched letters must not change");
        }
    }
}

#[tokio::test]
async fn test_failed_edit_leaves_artifact_and_job_intact() {
    let fx = fixture_with(
        MockProvider {
            fail_edits: true,
            ..Default::default()
        },
        |_| {},
    );
    let id = fx.service.submit(lola_request()).await.unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;

    let (before, _) = fx
        .service
        .download(id, &ArtifactKey::Letter(2))
        .await
        .unwrap();

    let err = fx.service.edit_letter(id, 2, "more sparkle").await;
    assert!(matches!(err, Err(BannerError::Adapter(_))));

    let report = fx.service.status(id).await.unwrap();
    assert_eq!(report.status, JobStatus::ReadyForReview);
    assert_eq!(report.cost_info.edit_calls, 0);
    let (after, _) = fx
        .service
        .download(id, &ArtifactKey::Letter(2))
        .await
        .unwrap();
    assert_eq!(before, after);

    // The reservation was released, so the job can still be approved
    let report = fx.service.approve(id).await.unwrap();
    assert_eq!(report.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_concurrent_edits_on_same_letter_are_rejected() {
    let fx = fixture_with(
        MockProvider {
            edit_delay_ms: 200,
            ..Default::default()
        },
        |_| {},
    );
    let id = fx.service.submit(lola_request()).await.unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;

    let service = fx.service.clone();
    let first = tokio::spawn(async move { service.edit_letter(id, 1, "more tentacles").await });

    // Let the first edit reach the provider, then race a second one
    tokio::time::sleep(Duration::from_millis(50)).await;
    match fx.service.edit_letter(id, 1, "fewer tentacles").await {
        Err(BannerError::Validation(msg)) => assert!(msg.contains("already has an edit")),
        other => panic!("Expected a rejected edit, got {:?}", other.map(|r| r.status)),
    }

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::ReadyForReview);
    assert_eq!(report.cost_info.edit_calls, 1);

    // The reservation is gone once the first edit finishes
    let report = fx.service.edit_letter(id, 1, "blue tentacles").await.unwrap();
    assert_eq!(report.cost_info.edit_calls, 2);
}

#[tokio::test]
async fn test_edit_rejects_out_of_range_index() {
    let fx = fixture();
    let id = fx.service.submit(lola_request()).await.unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;

    assert!(matches!(
        fx.service.edit_letter(id, 4, "anything").await,
        Err(BannerError::Validation(_))
    ));
    assert!(matches!(
        fx.service.edit_letter(id, 0, "  ").await,
        Err(BannerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_admission_caps_concurrent_generation() {
    let fx = fixture_with(
        MockProvider {
            generate_delay_ms: 30,
            ..Default::default()
        },
        |c| c.jobs.concurrent_generations = 2,
    );

    let mut ids = Vec::new();
    for name in ["Al", "Bo", "Cy", "Di", "Ed"] {
        let letters = name
            .chars()
            .map(|c| LetterSpec::new(c.to_ascii_uppercase(), "test theme"))
            .collect();
        let id = fx
            .service
            .submit(BannerRequest {
                name: name.to_string(),
                letters,
                color_palette: "ocean_breeze".to_string(),
                provider: "mock".to_string(),
            })
            .await
            .unwrap();
        ids.push(id);
    }

    for id in ids {
        assert_eq!(
            wait_for(&fx.service, id, JobStatus::ReadyForReview).await,
            JobStatus::ReadyForReview
        );
    }
    assert!(fx.provider.max_active.load(Ordering::SeqCst) <= 2);
    assert_eq!(fx.provider.generate_calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_submission_validation() {
    let fx = fixture();

    let mut request = lola_request();
    request.letters.clear();
    assert!(matches!(
        fx.service.submit(request).await,
        Err(BannerError::Validation(_))
    ));

    let mut request = lola_request();
    request.letters[1].glyph = '7';
    assert!(matches!(
        fx.service.submit(request).await,
        Err(BannerError::Validation(_))
    ));

    // Letters must spell the name
    let mut request = lola_request();
    request.name = "Mia".to_string();
    assert!(matches!(
        fx.service.submit(request).await,
        Err(BannerError::Validation(_))
    ));

    let mut request = lola_request();
    request.color_palette = "no_such_palette".to_string();
    assert!(matches!(
        fx.service.submit(request).await,
        Err(BannerError::NotFound(_))
    ));

    let mut request = lola_request();
    request.provider = "no_such_provider".to_string();
    assert!(matches!(
        fx.service.submit(request).await,
        Err(BannerError::NotFound(_))
    ));

    let mut request = lola_request();
    request.letters = (0..25).map(|_| LetterSpec::new('A', "too many")).collect();
    request.name = "A".repeat(25);
    assert!(matches!(
        fx.service.submit(request).await,
        Err(BannerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_cancel_discards_remaining_work() {
    let fx = fixture_with(
        MockProvider {
            generate_delay_ms: 50,
            ..Default::default()
        },
        |_| {},
    );
    let id = fx.service.submit(lola_request()).await.unwrap();
    fx.service.cancel(id).await.unwrap();

    let report = fx.service.status(id).await.unwrap();
    assert_eq!(report.status, JobStatus::Cancelled);

    // Give any in-flight call time to drain, then confirm nothing was promoted
    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = fx.service.status(id).await.unwrap();
    assert_eq!(report.status, JobStatus::Cancelled);
    assert!(report.progress < 100);

    // Cancelling twice is an error
    assert!(matches!(
        fx.service.cancel(id).await,
        Err(BannerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_discard_removes_job_and_artifacts() {
    let fx = fixture();
    let id = fx.service.submit(lola_request()).await.unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;

    fx.service.discard(id).await.unwrap();
    assert!(matches!(
        fx.service.status(id).await,
        Err(BannerError::NotFound(_))
    ));
    assert!(matches!(
        fx.service.download(id, &ArtifactKey::Letter(0)).await,
        Err(BannerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_sweep_removes_aged_jobs() {
    let fx = fixture();
    let id = fx.service.submit(lola_request()).await.unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;

    // Nothing is old enough yet
    assert_eq!(fx.service.sweep(chrono::Utc::now()).await, 0);
    assert!(fx.service.status(id).await.is_ok());

    // A day later everything is past the default 24h retention
    let later = chrono::Utc::now() + chrono::Duration::hours(25);
    assert_eq!(fx.service.sweep(later).await, 1);
    assert!(matches!(
        fx.service.status(id).await,
        Err(BannerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_theme_suggestions_round_trip_into_submission() {
    let fx = fixture();
    let letters = fx
        .service
        .suggest_themes("mock", "Lola", "ocean")
        .await
        .unwrap();
    assert_eq!(letters.len(), 4);
    assert_eq!(letters[0].glyph, 'L');
    assert!(letters[0].theme.contains("ocean"));

    let id = fx
        .service
        .submit(BannerRequest {
            name: "Lola".to_string(),
            letters,
            color_palette: "ocean_breeze".to_string(),
            provider: "mock".to_string(),
        })
        .await
        .unwrap();
    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;
}

#[tokio::test]
async fn test_approve_requires_review_state() {
    let fx = fixture_with(
        MockProvider {
            generate_delay_ms: 100,
            ..Default::default()
        },
        |_| {},
    );
    let id = fx.service.submit(lola_request()).await.unwrap();

    // Still queued or generating
    assert!(matches!(
        fx.service.approve(id).await,
        Err(BannerError::Validation(_))
    ));

    wait_for(&fx.service, id, JobStatus::ReadyForReview).await;
    fx.service.approve(id).await.unwrap();

    // Approving a completed job is also rejected
    assert!(matches!(
        fx.service.approve(id).await,
        Err(BannerError::Validation(_))
    ));
}
