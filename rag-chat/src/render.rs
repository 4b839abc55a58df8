//! Terminal rendering of answer text.
//!
//! Two paths:
//! - [`render_plain`] for every partial update: no parsing, just the text.
//! - [`render_markdown`] once per exchange on the finalized answer: Markdown
//!   converted to ANSI-styled terminal text.
//!
//! | Input              | Output                         |
//! |--------------------|--------------------------------|
//! | `# Title`          | bold + underlined              |
//! | `## Subtitle`      | bold                           |
//! | `### Section`      | italic                         |
//! | `- Item`, `* Item` | `• Item`                       |
//! | `1. Item`          | unchanged                      |
//! | `> Quote`          | `┃ Quote` (dim)                |
//! | ` ```code``` `     | indented, cyan, no inline pass |
//! | `**bold**`         | bold                           |
//! | `_italic_`         | italic                         |
//! | `` `code` ``       | cyan                           |
//! | `[text](url)`      | `text (url)`, url underlined   |

use regex::Regex;
use std::sync::LazyLock;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const UNDERLINE: &str = "\x1b[4m";
const CYAN: &str = "\x1b[36m";

static H1_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^# (.+)$").unwrap());
static H2_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^## (.+)$").unwrap());
static H3_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{3,6} (.+)$").unwrap());
static BULLET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[-*+] (.*)$").unwrap());
static QUOTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^> ?(.*)$").unwrap());
static FENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*```").unwrap());
static BOLD_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+?)_\b").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+?)`").unwrap());
static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());

/// Cheap render used while the answer is still streaming.
pub fn render_plain(text: &str) -> String {
    text.to_string()
}

/// Rich render of a complete answer.
pub fn render_markdown(input: &str) -> String {
    let mut out = Vec::new();
    let mut in_code_block = false;

    for line in input.lines() {
        if FENCE_PATTERN.is_match(line) {
            in_code_block = !in_code_block;
            continue;
        }

        if in_code_block {
            out.push(format!("    {CYAN}{line}{RESET}"));
        } else {
            out.push(convert_line(line));
        }
    }

    out.join("\n")
}

/// Convert one non-code line: block-level markers first, then inline styles.
fn convert_line(line: &str) -> String {
    if let Some(caps) = H1_PATTERN.captures(line) {
        return format!("{BOLD}{UNDERLINE}{}{RESET}", convert_inline(&caps[1]));
    }
    if let Some(caps) = H2_PATTERN.captures(line) {
        return format!("{BOLD}{}{RESET}", convert_inline(&caps[1]));
    }
    if let Some(caps) = H3_PATTERN.captures(line) {
        return format!("{ITALIC}{}{RESET}", convert_inline(&caps[1]));
    }
    if let Some(caps) = BULLET_PATTERN.captures(line) {
        return format!("{}• {}", &caps[1], convert_inline(&caps[2]));
    }
    if let Some(caps) = QUOTE_PATTERN.captures(line) {
        return format!("{DIM}┃ {}{RESET}", convert_inline(&caps[1]));
    }
    convert_inline(line)
}

/// Apply inline styles. Code spans are cut out first so their contents stay literal.
fn convert_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in INLINE_CODE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&convert_emphasis(&text[last..whole.start()]));
        out.push_str(&format!("{CYAN}{}{RESET}", &caps[1]));
        last = whole.end();
    }
    out.push_str(&convert_emphasis(&text[last..]));
    out
}

fn convert_emphasis(text: &str) -> String {
    let text = LINK_PATTERN.replace_all(text, format!("$1 ({UNDERLINE}$2{RESET})").as_str());
    let text = BOLD_PATTERN.replace_all(&text, format!("{BOLD}$1{RESET}").as_str());
    ITALIC_PATTERN
        .replace_all(&text, format!("{ITALIC}$1{RESET}").as_str())
        .into_owned()
}

/// Remove ANSI escape sequences.
pub fn strip_ansi(text: &str) -> String {
    static ANSI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    ANSI.replace_all(text, "").into_owned()
}
