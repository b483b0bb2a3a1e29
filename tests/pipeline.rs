//! Integration tests: the full orchestrator → pandoc adapter → processor →
//! assembler → storage path, with a shell script standing in for pandoc.
//!
//! The fake "DOCX" files are the ZIP magic followed by the intermediate HTML
//! the script should emit, so each test controls exactly what the processor
//! sees. Marker strings in that HTML make the script misbehave on purpose:
//!
//! | marker            | script behaviour                         |
//! |-------------------|------------------------------------------|
//! | `SLOW_DOCUMENT`   | sleeps far past any timeout              |
//! | `BROKEN_DOCUMENT` | prints a parse error and exits 64        |
//! | `NOISY_DOCUMENT`  | succeeds but prints a `[WARNING]` line   |
//!
//! Every run also extracts one image, `media/image1.png`.

#![cfg(unix)]

use docx2md::{
    ConversionConfig, ConversionOptions, ConversionWarning, Docx2MdError, ErrorKind, FsStorage,
    MathEngine, Orchestrator, TaskStatus,
};
use futures::StreamExt;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const FAKE_PANDOC: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "pandoc 3.1.9"
  exit 0
fi
src="$1"
for arg in "$@"; do
  case "$arg" in
    --extract-media=*) media="${arg#--extract-media=}" ;;
    --output=*) out="${arg#--output=}" ;;
  esac
done
if grep -q SLOW_DOCUMENT "$src"; then
  exec sleep 30
fi
if grep -q BROKEN_DOCUMENT "$src"; then
  echo "Couldn't parse docx file" >&2
  exit 64
fi
mkdir -p "$media/media"
printf 'PNG' > "$media/media/image1.png"
tail -c +5 "$src" > "$out"
if grep -q NOISY_DOCUMENT "$src"; then
  echo "[WARNING] Could not determine image size" >&2
fi
exit 0
"#;

const MATHML: &str = r#"<math display="inline"><semantics><mrow><mi>E</mi><mo>=</mo><mi>m</mi><msup><mi>c</mi><mn>2</mn></msup></mrow><annotation encoding="application/x-tex">E = mc^{2}</annotation></semantics></math>"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for sub in ["docx", "md", "scratch"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        let script = dir.path().join("fake-pandoc");
        std::fs::write(&script, FAKE_PANDOC).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    /// Store a fake DOCX whose conversion yields `body` wrapped in a page.
    fn add(&self, name: &str, body: &str) {
        let html = format!(
            "<!DOCTYPE html>\n<html><head><title>{name}</title></head><body>\n{body}\n</body></html>\n"
        );
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(html.as_bytes());
        std::fs::write(self.dir.path().join("docx").join(name), bytes).unwrap();
    }

    fn output(&self, rel: &str) -> PathBuf {
        self.dir.path().join("md").join(rel)
    }

    fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch()).unwrap().next().is_none()
    }

    fn config(&self) -> docx2md::ConversionConfigBuilder {
        ConversionConfig::builder()
            .converter_program(self.dir.path().join("fake-pandoc"))
            .scratch_root(self.scratch())
            .converter_timeout_secs(20)
    }

    async fn orchestrator(&self, config: ConversionConfig) -> Orchestrator {
        let storage = FsStorage::new(self.dir.path().join("docx"), self.dir.path().join("md"));
        Orchestrator::new(config, Arc::new(storage)).await.unwrap()
    }

    async fn default_orchestrator(&self) -> Orchestrator {
        self.orchestrator(self.config().build().unwrap()).await
    }
}

fn options(f: impl FnOnce(&mut ConversionOptions)) -> ConversionOptions {
    let mut o = ConversionOptions::default();
    f(&mut o);
    o
}

// ── Properties ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn converting_twice_is_byte_identical() {
    let fx = Fixture::new();
    fx.add(
        "doc.docx",
        &format!(
            "<h1>Title</h1><p>Some <strong>bold</strong> text and {MATHML}.</p>\
             <ul><li>one<ul><li>nested</li></ul></li><li>two</li></ul>\
             <p><img src=\"./images/media/image1.png\" alt=\"Logo\"></p>"
        ),
    );
    let orch = fx.default_orchestrator().await;

    let first = orch.convert_one(orch.request("doc.docx").unwrap()).await.unwrap();
    let second = orch.convert_one(orch.request("doc.docx").unwrap()).await.unwrap();
    assert_eq!(first.markdown, second.markdown);
    assert_eq!(
        std::fs::read_to_string(fx.output("doc/doc.md")).unwrap(),
        second.markdown
    );
}

#[tokio::test]
async fn merged_cells_keep_their_attributes() {
    let fx = Fixture::new();
    fx.add(
        "table.docx",
        r#"<table><colgroup><col style="width: 40%"></colgroup>
<tr><td rowspan="2" colspan="3">merged</td></tr>
<tr></tr>
</table>"#,
    );
    let orch = fx.default_orchestrator().await;
    let result = orch.convert_one(orch.request("table.docx").unwrap()).await.unwrap();

    assert!(
        result.markdown.contains(r#"<td rowspan="2" colspan="3">merged</td>"#),
        "{}",
        result.markdown
    );
    assert!(!result.markdown.contains("colgroup"));
    assert_eq!(result.stats.tables, 1);
}

#[tokio::test]
async fn mathml_is_kept_verbatim() {
    let fx = Fixture::new();
    fx.add("math.docx", &format!("<p>Energy: {MATHML}</p>"));
    let orch = fx.default_orchestrator().await;
    let result = orch.convert_one(orch.request("math.docx").unwrap()).await.unwrap();

    assert!(result.markdown.contains(MATHML), "{}", result.markdown);
    assert_eq!(result.stats.math, 1);
}

#[tokio::test]
async fn latex_engine_uses_the_annotation() {
    let fx = Fixture::new();
    fx.add("math.docx", &format!("<p>Energy: {MATHML}</p>"));
    let orch = fx.default_orchestrator().await;
    let request = orch
        .request_with("math.docx", options(|o| o.math_engine = MathEngine::Latex))
        .unwrap();
    let result = orch.convert_one(request).await.unwrap();

    assert!(result.markdown.contains("$E = mc^{2}$"), "{}", result.markdown);
    assert!(!result.markdown.contains("<math"));
}

#[tokio::test]
async fn latex_without_annotation_falls_back_with_a_warning() {
    let fx = Fixture::new();
    fx.add(
        "math.docx",
        r#"<p><math display="inline"><mi>x</mi></math> and <math display="inline"><semantics><mi>y</mi><annotation encoding="application/x-tex">y</annotation></semantics></math></p>"#,
    );
    let orch = fx.default_orchestrator().await;
    let request = orch
        .request_with("math.docx", options(|o| o.math_engine = MathEngine::Latex))
        .unwrap();
    let result = orch.convert_one(request).await.unwrap();

    assert!(result.markdown.contains(r#"<math display="inline"><mi>x</mi></math>"#));
    assert!(result.markdown.contains("$y$"));
    assert!(matches!(
        result.warnings.as_slice(),
        [ConversionWarning::UnresolvedMath { node: 1, .. }]
    ));
}

#[tokio::test]
async fn images_are_relinked_and_copied() {
    let fx = Fixture::new();
    fx.add(
        "pics.docx",
        r#"<p><img src="./images/media/image1.png" alt="Logo"></p>"#,
    );
    let orch = fx.default_orchestrator().await;
    let result = orch.convert_one(orch.request("pics.docx").unwrap()).await.unwrap();

    assert!(
        result.markdown.contains("![Logo](./images/image1.png)"),
        "{}",
        result.markdown
    );
    // The link is relative to the Markdown file and must resolve
    let linked = result.output_path.parent().unwrap().join("images/image1.png");
    assert!(linked.is_file());
    assert_eq!(std::fs::read(&linked).unwrap(), b"PNG");
    assert_eq!(result.media.len(), 1);
    assert_eq!(result.media[0].persisted_path.as_deref(), Some(linked.as_path()));
}

#[tokio::test]
async fn images_can_be_dropped() {
    let fx = Fixture::new();
    fx.add(
        "pics.docx",
        r#"<p><img src="./images/media/image1.png" alt="Logo"></p>"#,
    );
    let orch = fx.default_orchestrator().await;
    let request = orch
        .request_with("pics.docx", options(|o| o.preserve_images = false))
        .unwrap();
    let result = orch.convert_one(request).await.unwrap();

    assert!(!result.markdown.contains("image1.png"), "{}", result.markdown);
    assert!(!result.markdown.contains("]("));
    assert!(result.markdown.contains("Logo"));
    assert!(result.media.is_empty());
    assert!(!fx.output("pics/images").exists());
}

#[tokio::test]
async fn toc_links_follow_duplicate_suffix_rule() {
    let fx = Fixture::new();
    fx.add(
        "toc.docx",
        "<h1>Heading 1</h1><p>a</p><h2>Heading 2</h2><p>b</p><h2>Heading 2</h2><p>c</p>",
    );
    let orch = fx.default_orchestrator().await;
    let request = orch
        .request_with(
            "toc.docx",
            options(|o| {
                o.include_toc = true;
                o.toc_depth = 2;
            }),
        )
        .unwrap();
    let md = orch.convert_one(request).await.unwrap().markdown;

    let links: Vec<&str> = md
        .lines()
        .filter_map(|l| l.trim_start().strip_prefix("- ["))
        .collect();
    assert_eq!(
        links,
        vec![
            "Heading 1](#heading-1)",
            "Heading 2](#heading-2)",
            "Heading 2](#heading-2-1)"
        ],
        "{md}"
    );
    let toc_end = md.find("# Heading 1").unwrap();
    assert!(md[..toc_end].contains("Table of Contents"));
}

#[tokio::test]
async fn toc_depth_is_ignored_without_toc() {
    let fx = Fixture::new();
    fx.add("toc.docx", "<h1>Only</h1>");
    let orch = fx.default_orchestrator().await;
    let request = orch
        .request_with(
            "toc.docx",
            options(|o| {
                o.include_toc = false;
                o.toc_depth = 1;
            }),
        )
        .unwrap();
    let md = orch.convert_one(request).await.unwrap().markdown;
    assert_eq!(md, "# Only\n");
}

#[tokio::test]
async fn missing_image_degrades_instead_of_failing() {
    let fx = Fixture::new();
    fx.add(
        "partial.docx",
        r#"<p><img src="./images/media/image1.png" alt="ok"></p><p><img src="./images/media/absent.png"></p>"#,
    );
    let orch = fx.default_orchestrator().await;
    let request = orch.request("partial.docx").unwrap();
    let id = request.id().to_string();
    let result = orch.convert_one(request).await.unwrap();

    assert_eq!(orch.task_status(&id).unwrap().status, TaskStatus::Succeeded);
    assert_eq!(
        result.warnings,
        vec![ConversionWarning::MissingMedia {
            reference: "./images/media/absent.png".into()
        }]
    );
    assert!(result.markdown.contains("*[missing image: absent.png]*"));
    assert!(result.markdown.contains("./images/image1.png"));
}

#[tokio::test]
async fn batch_tasks_do_not_affect_each_other() {
    let fx = Fixture::new();
    fx.add("one.docx", "<p>first</p>");
    fx.add("three.docx", "<p>third</p>");
    let orch = fx.default_orchestrator().await;

    let requests = ["one.docx", "two.docx", "three.docx"]
        .iter()
        .map(|n| orch.request(n).unwrap())
        .collect();
    let handle = orch.convert_batch(requests).unwrap();
    let ids = handle.task_ids.clone();
    let summary = handle.join().await.unwrap();
    assert_eq!((summary.succeeded, summary.failed), (2, 1));

    let tasks: Vec<_> = ids.iter().map(|id| orch.task_status(id).unwrap()).collect();
    assert_eq!(tasks[0].status, TaskStatus::Succeeded);
    assert_eq!(tasks[1].status, TaskStatus::Failed);
    assert_eq!(tasks[1].error.as_ref().unwrap().kind, ErrorKind::Input);
    assert!(tasks[1].result.is_none());
    assert_eq!(tasks[2].status, TaskStatus::Succeeded);
    assert_eq!(tasks[0].result.as_ref().unwrap().markdown, "first\n");
    assert_eq!(tasks[2].result.as_ref().unwrap().markdown, "third\n");
}

#[tokio::test]
async fn timeout_fails_the_task_and_leaves_no_scratch() {
    let fx = Fixture::new();
    fx.add("slow.docx", "<p>SLOW_DOCUMENT</p>");
    let config = fx.config().converter_timeout_secs(1).build().unwrap();
    let orch = fx.orchestrator(config).await;
    let request = orch.request("slow.docx").unwrap();
    let id = request.id().to_string();

    let err = orch.convert_one(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let task = orch.task_status(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.unwrap().kind, ErrorKind::Timeout);
    assert!(fx.scratch_is_empty());
    assert!(!fx.output("slow/slow.md").exists());
}

// ── Failure modes and extras ─────────────────────────────────────────────────

#[tokio::test]
async fn converter_failure_is_non_zero_exit() {
    let fx = Fixture::new();
    fx.add("broken.docx", "BROKEN_DOCUMENT");
    let orch = fx.default_orchestrator().await;
    let err = orch
        .convert_one(orch.request("broken.docx").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonZeroExit);
    assert!(err.to_string().contains("corrupt"), "{err}");
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn non_zip_source_is_an_input_error() {
    let fx = Fixture::new();
    std::fs::write(fx.dir.path().join("docx/plain.docx"), b"just text").unwrap();
    let orch = fx.default_orchestrator().await;
    let err = orch
        .convert_one(orch.request("plain.docx").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Docx2MdError::NotADocx { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[tokio::test]
async fn oversized_source_is_rejected() {
    let fx = Fixture::new();
    fx.add("big.docx", &"x".repeat(2048));
    let config = fx.config().max_file_size(1024).build().unwrap();
    let orch = fx.orchestrator(config).await;
    let err = orch
        .convert_one(orch.request("big.docx").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Docx2MdError::FileTooLarge { .. }), "{err}");
}

#[test]
fn wrong_extension_never_becomes_a_task() {
    let err = docx2md::ConversionRequest::new("notes.pdf", ConversionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[tokio::test]
async fn converter_warnings_are_reported() {
    let fx = Fixture::new();
    fx.add("noisy.docx", "<p>NOISY_DOCUMENT</p>");
    let orch = fx.default_orchestrator().await;
    let result = orch
        .convert_one(orch.request("noisy.docx").unwrap())
        .await
        .unwrap();
    assert_eq!(
        result.warnings,
        vec![ConversionWarning::ConverterDiagnostic {
            message: "Could not determine image size".into()
        }]
    );
}

#[tokio::test]
async fn missing_pandoc_fails_at_construction() {
    let fx = Fixture::new();
    let config = ConversionConfig::builder()
        .converter_program("/definitely/not/pandoc")
        .build()
        .unwrap();
    let storage = FsStorage::new(fx.dir.path().join("docx"), fx.dir.path().join("md"));
    let err = Orchestrator::new(config, Arc::new(storage)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn shape_text_and_nested_lists_survive() {
    let fx = Fixture::new();
    fx.add(
        "shapes.docx",
        r#"<figure><div class="textbox"><p>Inside the box</p></div><figcaption>Figure 1</figcaption></figure>
<ol><li><p>Step one</p><p>More about step one</p><ul><li>detail</li></ul></li><li><p>Step two</p></li></ol>"#,
    );
    let orch = fx.default_orchestrator().await;
    let md = orch
        .convert_one(orch.request("shapes.docx").unwrap())
        .await
        .unwrap()
        .markdown;

    let caption = md.find("Figure 1").unwrap();
    let text = md.find("Inside the box").unwrap();
    assert!(caption < text, "{md}");
    assert!(md.contains("1. Step one\n\n   More about step one\n\n   - detail"), "{md}");
}

#[tokio::test]
async fn stream_reports_every_task() {
    let fx = Fixture::new();
    fx.add("a.docx", "<p>a</p>");
    fx.add("b.docx", "<p>b</p>");
    let orch = fx.default_orchestrator().await;
    let requests = ["a.docx", "b.docx", "gone.docx"]
        .iter()
        .map(|n| orch.request(n).unwrap())
        .collect();

    let tasks: Vec<_> = orch.convert_stream(requests).unwrap().collect().await;
    assert_eq!(tasks.len(), 3);
    assert_eq!(
        tasks.iter().filter(|t| t.status == TaskStatus::Succeeded).count(),
        2
    );
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn list_and_check_dependencies() {
    let fx = Fixture::new();
    fx.add("b.docx", "<p>b</p>");
    fx.add("a.docx", "<p>a</p>");
    let orch = fx.default_orchestrator().await;
    let report = orch.check_dependencies().await.unwrap();
    assert_eq!(report.converter_version, "pandoc 3.1.9");
    assert!(report.storage_ok);

    let storage = FsStorage::new(fx.dir.path().join("docx"), fx.dir.path().join("md"));
    let ids = docx2md::Storage::list_sources(&storage).await.unwrap();
    assert_eq!(ids, vec!["a.docx", "b.docx"]);
}

fn assert_send_sync<T: Send + Sync>(_: &T) {}

#[tokio::test]
async fn orchestrator_is_shareable_across_tasks() {
    let fx = Fixture::new();
    fx.add("a.docx", "<p>a</p>");
    let orch = fx.default_orchestrator().await;
    assert_send_sync(&orch);
    let clone = orch.clone();
    let request = orch.request("a.docx").unwrap();
    let id = request.id().to_string();
    tokio::spawn(async move { clone.convert_one(request).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(orch.task_status(&id).unwrap().status, TaskStatus::Succeeded);
}
