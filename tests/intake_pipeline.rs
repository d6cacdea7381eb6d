//! End-to-end tests of the document pipeline against an in-memory transport
//! and a scripted completion provider.

mod common;

#[cfg(feature = "docx")]
use common::docx_with_body;
use common::{Harness, Sent};
use labcheck::extract::{Capabilities, DocumentFormat, ExtractError};
use labcheck::intake::{IntakeError, IntakeOutcome, MAX_FILE_BYTES};
use labcheck::models::{ChatId, IncomingDocument};
use labcheck::registry::default_model_id;

const CHAT: ChatId = ChatId(4242);

fn document(name: &str, size: u64, locator: &str) -> IncomingDocument {
    IncomingDocument {
        file_name: name.to_string(),
        file_size: size,
        locator: locator.to_string(),
    }
}

#[tokio::test]
async fn text_report_is_reviewed_and_relayed() {
    let h = Harness::new(Ok("Summary: solid work.\nFinal score: 34/40".to_string()));
    let body = "Lab 1: measured g = 9.81";
    h.transport.add_file("f1", body);

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("lab1.txt", body.len() as u64, "f1"))
        .await;

    match outcome {
        IntakeOutcome::Assessed {
            model,
            chars,
            chunks,
            completion_failed,
        } => {
            assert_eq!(model, default_model_id());
            assert_eq!(chars, body.chars().count());
            assert_eq!(chunks, 1);
            assert!(!completion_failed);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, default_model_id());
    assert!(requests[0]
        .prompt
        .ends_with("Lab work text:\nLab 1: measured g = 9.81\n"));

    let messages = h.transport.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].starts_with("⏳ Checking your work..."));
    assert_eq!(
        messages[1],
        format!(
            "📋 <b>Review result:</b>\n\n🤖 Model: {}\n\nSummary: solid work.\nFinal score: 34/40",
            default_model_id()
        )
    );

    let edits = h.transport.edits();
    assert_eq!(edits.len(), 2);
    assert!(edits[0].contains(&format!("Extracted {} characters", body.len())));
    assert!(edits[1].starts_with("✅ Review complete!"));
    assert!(edits[1].contains("<code>lab1.txt</code>"));

    assert_eq!(h.transport.downloads().len(), 1);
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn temporary_file_keeps_the_document_suffix() {
    let h = Harness::new(Ok("ok".to_string()));
    h.transport.add_file("f1", "text");

    h.intake(Capabilities::compiled())
        .handle_document(CHAT, &document("REPORT.TXT", 4, "f1"))
        .await;

    let downloads = h.transport.downloads();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].parent().unwrap(), h.work_dir());
    assert!(downloads[0].to_string_lossy().ends_with(".txt"));
    assert!(!downloads[0].exists());
}

#[tokio::test]
async fn cp1251_text_is_decoded() {
    let h = Harness::new(Ok("ok".to_string()));
    let (bytes, _, had_errors) = encoding_rs::WINDOWS_1251.encode("Лабораторная работа №3");
    assert!(!had_errors);
    h.transport.add_file("f1", bytes.into_owned());

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("lab3.txt", 22, "f1"))
        .await;

    assert!(matches!(outcome, IntakeOutcome::Assessed { .. }));
    let requests = h.provider.requests();
    assert!(requests[0].prompt.contains("Лабораторная работа №3"));
}

#[tokio::test]
async fn oversized_file_is_rejected_without_download() {
    let h = Harness::new(Ok("unused".to_string()));

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("big.pdf", MAX_FILE_BYTES + 1, "f1"))
        .await;

    assert!(matches!(
        outcome,
        IntakeOutcome::Rejected(IntakeError::SizeExceeded { .. })
    ));
    assert_eq!(
        h.transport.sent(),
        vec![Sent::Message {
            chat: CHAT,
            text: "❌ File is too large (max 20 MB).".to_string(),
            keyboard: true,
        }]
    );
    assert!(h.transport.downloads().is_empty());
    assert!(h.provider.requests().is_empty());
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let h = Harness::new(Ok("unused".to_string()));

    for name in ["notes.rtf", "photo.png", "README"] {
        let outcome = h
            .intake(Capabilities::compiled())
            .handle_document(CHAT, &document(name, 10, "f1"))
            .await;
        assert!(
            matches!(outcome, IntakeOutcome::Rejected(IntakeError::UnsupportedFormat(_))),
            "{} should be rejected",
            name
        );
    }

    let messages = h.transport.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages
        .iter()
        .all(|m| m == "❌ Unsupported file format. Send a PDF, DOCX or TXT file."));
    assert!(h.transport.downloads().is_empty());
}

#[tokio::test]
async fn blank_text_is_reported_as_empty() {
    let h = Harness::new(Ok("unused".to_string()));
    h.transport.add_file("f1", "  \n\t \r\n");

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("blank.txt", 7, "f1"))
        .await;

    assert!(matches!(
        outcome,
        IntakeOutcome::Failed(IntakeError::EmptyContent)
    ));
    let edits = h.transport.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(
        edits[0],
        "❌ Error while processing the file:\n<code>the file is empty or contains no readable text</code>"
    );
    assert!(h.provider.requests().is_empty());
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn failed_download_is_reported_and_cleaned_up() {
    let h = Harness::new(Ok("unused".to_string()));

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("lab.txt", 10, "missing"))
        .await;

    assert!(matches!(
        outcome,
        IntakeOutcome::Failed(IntakeError::Transport(_))
    ));
    let edits = h.transport.edits();
    assert_eq!(edits.len(), 1);
    assert!(edits[0].contains("file missing not found"));
    assert_eq!(h.transport.downloads().len(), 1);
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn long_assessment_is_split_into_continuations() {
    let h = Harness::new(Ok("x".repeat(9500)));
    h.transport.add_file("f1", "report");

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("lab.txt", 6, "f1"))
        .await;

    assert!(matches!(outcome, IntakeOutcome::Assessed { chunks: 3, .. }));
    let messages = h.transport.messages();
    // status message, then three result parts
    assert_eq!(messages.len(), 4);
    assert!(messages[1].starts_with("📋 <b>Review result:</b>\n\n🤖 Model: "));
    assert!(messages[2].starts_with("📋 <b>Review result (continuation 2):</b>\n\n"));
    assert!(messages[3].starts_with("📋 <b>Review result (continuation 3):</b>\n\n"));
}

#[tokio::test]
async fn completion_failure_is_relayed_in_band() {
    let h = Harness::new(Err("API error 429 Too Many Requests: rate limited".to_string()));
    h.transport.add_file("f1", "report");

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("lab.txt", 6, "f1"))
        .await;

    assert!(matches!(
        outcome,
        IntakeOutcome::Assessed {
            completion_failed: true,
            chunks: 1,
            ..
        }
    ));
    let edits = h.transport.edits();
    assert!(edits[1].starts_with("⚠️ Review finished without an assessment"));
    let messages = h.transport.messages();
    assert_eq!(
        messages[1],
        "📋 <b>Review result:</b>\n\n❌ AI request failed: API error 429 Too Many Requests: rate limited"
    );
}

#[tokio::test]
async fn disabled_extractor_fails_before_download() {
    let h = Harness::new(Ok("unused".to_string()));
    let none = Capabilities {
        pdf: false,
        docx: false,
    };

    let outcome = h
        .intake(none)
        .handle_document(CHAT, &document("lab.docx", 100, "f1"))
        .await;

    assert!(matches!(
        outcome,
        IntakeOutcome::Failed(IntakeError::Extraction(ExtractError::DependencyMissing(
            DocumentFormat::Docx
        )))
    ));
    assert!(h.transport.downloads().is_empty());
    let edits = h.transport.edits();
    assert!(edits[0].contains("DOCX support is not available on this server"));
}

#[cfg(feature = "docx")]
#[tokio::test]
async fn docx_report_is_reviewed() {
    let h = Harness::new(Ok("fine".to_string()));
    let bytes = docx_with_body(
        "<w:p><w:r><w:t>Goal</w:t></w:r></w:p><w:p><w:r><w:t>Measure the pendulum period</w:t></w:r></w:p>",
    );
    let size = bytes.len() as u64;
    h.transport.add_file("f1", bytes);

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("Lab2.DOCX", size, "f1"))
        .await;

    assert!(matches!(outcome, IntakeOutcome::Assessed { .. }));
    let prompt = &h.provider.requests()[0].prompt;
    assert!(prompt.contains("Goal"));
    assert!(prompt.contains("Measure the pendulum period"));
    assert!(h.work_dir_is_empty());
}

#[cfg(feature = "docx")]
#[tokio::test]
async fn docx_without_text_is_empty() {
    let h = Harness::new(Ok("unused".to_string()));
    let bytes = docx_with_body("<w:p></w:p><w:p><w:r><w:t>   </w:t></w:r></w:p>");
    let size = bytes.len() as u64;
    h.transport.add_file("f1", bytes);

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("empty.docx", size, "f1"))
        .await;

    assert!(matches!(
        outcome,
        IntakeOutcome::Failed(IntakeError::EmptyContent)
    ));
    assert!(h.provider.requests().is_empty());
}

#[cfg(feature = "pdf")]
#[tokio::test]
async fn corrupt_pdf_reports_extraction_error() {
    let h = Harness::new(Ok("unused".to_string()));
    h.transport.add_file("f1", "this is not a pdf");

    let outcome = h
        .intake(Capabilities::compiled())
        .handle_document(CHAT, &document("lab.pdf", 17, "f1"))
        .await;

    assert!(matches!(
        outcome,
        IntakeOutcome::Failed(IntakeError::Extraction(ExtractError::Pdf(_)))
    ));
    assert!(h.transport.edits()[0].contains("PDF extraction failed"));
    assert!(h.work_dir_is_empty());
}
