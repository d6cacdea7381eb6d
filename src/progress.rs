//! Intake progress reporting.
//!
//! Each document request owns one status message that is edited as the
//! request moves through its stages, so users see what is happening while
//! the model works. [`IntakeStatus::render`] produces the HTML for each stage.

use crate::transport::escape_html;

/// Stage of a document request, as shown in its status message.
#[derive(Clone, Debug, PartialEq)]
pub enum IntakeStatus<'a> {
    /// Accepted; downloading and extracting.
    Processing { model: &'a str },
    /// Text extracted; waiting for the model.
    Extracted { model: &'a str, chars: usize },
    /// Assessment relayed.
    Completed {
        model: &'a str,
        file_name: &'a str,
        chars: usize,
    },
    /// The completion call failed; the error text is relayed as the result.
    CompletedWithoutAssessment {
        model: &'a str,
        file_name: &'a str,
        chars: usize,
    },
    /// The request failed before an assessment was produced.
    Failed { error: &'a str },
}

impl IntakeStatus<'_> {
    pub fn render(&self) -> String {
        match self {
            IntakeStatus::Processing { model } => format!(
                "⏳ Checking your work...\n🤖 Model: <code>{}</code>",
                escape_html(model)
            ),
            IntakeStatus::Extracted { model, chars } => format!(
                "🔄 Extracted {} characters. Sending for review...\n🤖 Model: <code>{}</code>",
                format_number(*chars as u64),
                escape_html(model)
            ),
            IntakeStatus::Completed {
                model,
                file_name,
                chars,
            } => format!(
                "✅ Review complete!\n{}",
                summary(model, file_name, *chars)
            ),
            IntakeStatus::CompletedWithoutAssessment {
                model,
                file_name,
                chars,
            } => format!(
                "⚠️ Review finished without an assessment\n{}",
                summary(model, file_name, *chars)
            ),
            IntakeStatus::Failed { error } => format!(
                "❌ Error while processing the file:\n<code>{}</code>",
                escape_html(error)
            ),
        }
    }
}

fn summary(model: &str, file_name: &str, chars: usize) -> String {
    format!(
        "🤖 Model: <code>{}</code>\n📄 File: <code>{}</code>\n📝 Characters: {}",
        escape_html(model),
        escape_html(file_name),
        format_number(chars as u64)
    )
}

/// Format a number with comma separators (e.g. 1234567 → "1,234,567").
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}
