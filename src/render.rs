use crate::codec::{self, AnswerShape};
use crate::model::{Attachment, AttemptMetadata, Task};
use crate::navigation::Progress;

const BLOCK_TAGS: [&str; 12] = [
    "p", "div", "tr", "table", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6",
];
const SKIPPED_CONTENT_TAGS: [&str; 2] = ["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSlideView {
    pub task_id: u64,
    pub header: String,
    pub statement: Vec<String>,
    pub attachments: Vec<AttachmentView>,
    pub answer: AnswerRegionView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentView {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRegionView {
    pub shape: AnswerShape,
    pub rows: usize,
    pub cols: usize,
    pub column_headers: Vec<String>,
    pub fields: Vec<FieldView>,
}

impl AnswerRegionView {
    pub fn field_values(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.value.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub row: usize,
    pub col: usize,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSlideView {
    pub title: String,
    pub lines: Vec<String>,
}

/// Builds the display fragment for one task, seeded from its stored answer.
pub fn render_task(task: &Task, current_answer_raw: Option<&str>) -> TaskSlideView {
    TaskSlideView {
        task_id: task.variant_task_id,
        header: format!("KIM № {}", task.number),
        statement: statement_text(&task.statement_html),
        attachments: task.attachments.iter().map(attachment_view).collect(),
        answer: answer_region(task.shape, current_answer_raw.unwrap_or("")),
    }
}

fn answer_region(shape: AnswerShape, raw: &str) -> AnswerRegionView {
    let values = codec::decode(shape, raw).into_fields();
    let value_at = |idx: usize| values.get(idx).cloned().unwrap_or_default();
    match shape {
        AnswerShape::Single => AnswerRegionView {
            shape,
            rows: 1,
            cols: 1,
            column_headers: Vec::new(),
            fields: vec![FieldView {
                row: 0,
                col: 0,
                label: "Answer".to_string(),
                value: value_at(0),
            }],
        },
        AnswerShape::Double => AnswerRegionView {
            shape,
            rows: 1,
            cols: 2,
            column_headers: Vec::new(),
            fields: (0..2)
                .map(|col| FieldView {
                    row: 0,
                    col,
                    label: format!("Answer {}", col + 1),
                    value: value_at(col),
                })
                .collect(),
        },
        AnswerShape::Table { rows, cols } => AnswerRegionView {
            shape,
            rows,
            cols,
            column_headers: (1..=cols).map(|col| format!("Answer {col}")).collect(),
            fields: (0..rows)
                .flat_map(|row| (0..cols).map(move |col| (row, col)))
                .map(|(row, col)| FieldView {
                    row,
                    col,
                    label: format!("Row {}", row + 1),
                    value: value_at(row * cols + col),
                })
                .collect(),
        },
    }
}

fn attachment_view(attachment: &Attachment) -> AttachmentView {
    let name = if attachment.filename.trim().is_empty() {
        "attachment"
    } else {
        attachment.filename.trim()
    };
    let label = match attachment.size {
        Some(size) => format!("⬇ {name} ({})", format_size(size)),
        None => format!("⬇ {name}"),
    };
    AttachmentView {
        label,
        url: attachment.link().to_string(),
    }
}

pub fn render_info(metadata: &AttemptMetadata, progress: Progress) -> InfoSlideView {
    let mut lines = vec![
        format!("Attempt #{}", metadata.attempt_id),
        format!(
            "Started: {}",
            metadata.started_at.format("%d.%m.%Y %H:%M:%S UTC")
        ),
        format!(
            "Duration: {} min",
            metadata.duration_secs / 60
        ),
        format!("Answered: {}/{}", progress.answered, progress.total),
        String::new(),
        "Answers are saved when a field loses focus (Tab, Enter or changing slide).".to_string(),
        "The attempt is submitted automatically when the timer reaches zero.".to_string(),
    ];
    if let Some(variant_id) = metadata.variant_id {
        lines.insert(1, format!("Variant #{variant_id}"));
    }
    InfoSlideView {
        title: "Exam information".to_string(),
        lines,
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let value = bytes as f64;
    if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Flattens statement HTML into display lines: block tags and `<br>` break
/// lines, list items get a bullet, everything else is reduced to its text.
pub fn statement_text(html: &str) -> Vec<String> {
    let mut out = String::with_capacity(html.len());
    let mut skip_until: Option<String> = None;
    let mut chars = html.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                let mut tag = String::new();
                for next in chars.by_ref() {
                    if next == '>' {
                        break;
                    }
                    tag.push(next);
                }
                let (closing, name) = tag_name(&tag);
                if let Some(skipped) = skip_until.as_deref() {
                    if closing && name == skipped {
                        skip_until = None;
                    }
                    continue;
                }
                if !closing && SKIPPED_CONTENT_TAGS.contains(&name.as_str()) {
                    skip_until = Some(name);
                    continue;
                }
                apply_tag(&mut out, closing, &name);
            }
            _ if skip_until.is_some() => {}
            '&' => {
                let mut entity = String::new();
                while let Some(&next) = chars.peek() {
                    if next == ';' || entity.len() > 10 || next.is_whitespace() || next == '<' {
                        break;
                    }
                    entity.push(next);
                    chars.next();
                }
                if chars.peek() == Some(&';')
                    && let Some(decoded) = decode_entity(&entity)
                {
                    chars.next();
                    push_text(&mut out, decoded);
                } else {
                    push_text(&mut out, '&');
                    entity.chars().for_each(|c| push_text(&mut out, c));
                }
            }
            other => push_text(&mut out, other),
        }
    }

    let mut lines: Vec<String> = Vec::new();
    for line in out.split('\n').map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|last| last.is_empty()) {
            continue;
        }
        lines.push(line.to_string());
    }
    while lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines
}

fn tag_name(tag: &str) -> (bool, String) {
    let trimmed = tag.trim();
    let (closing, rest) = match trimmed.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let name = rest
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    (closing, name)
}

fn apply_tag(out: &mut String, closing: bool, name: &str) {
    match name {
        "br" => out.push('\n'),
        "li" if !closing => {
            break_line(out);
            out.push_str("• ");
        }
        "li" => break_line(out),
        "td" | "th" if closing => out.push(' '),
        _ if BLOCK_TAGS.contains(&name) => break_line(out),
        _ => {}
    }
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Collapses runs of whitespace the way a browser does.
fn push_text(out: &mut String, ch: char) {
    if ch == '\u{a0}' {
        out.push(' ');
        return;
    }
    if ch.is_whitespace() {
        if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
            out.push(' ');
        }
        return;
    }
    out.push(ch);
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "laquo" => Some('«'),
        "raquo" => Some('»'),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
