/*!
format.rs

Styling primitives for the human output mode of `storctl`.

  - StyleOptions::detect() / StyleOptions::plain()
  - color(role, text, &StyleOptions) -> String
  - emoji(tag, &StyleOptions) -> &'static str
  - box_header(title, subtitle_opt, &StyleOptions) -> String
  - wrap_text(s, max_width) -> Vec<String>

Everything here returns strings and never prints. Output depends only on
the inputs and the `StyleOptions` value, so the same trace rendered twice
is byte-identical. JSON mode does not use these helpers.

Environment:
  NO_COLOR  disable ANSI colour
  NO_EMOJI  disable status glyphs
  COLUMNS   box width hint (clamped 40..=200, default 100)
*/

use std::borrow::Cow;

/* -------------------------------------------------------------------------- */
/* Style Options                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub term_width: usize,
    pub padding: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self::plain()
    }
}

impl StyleOptions {
    /// Style from the environment (`NO_COLOR`, `NO_EMOJI`, `COLUMNS`).
    pub fn detect() -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 200))
            .unwrap_or(100);

        StyleOptions {
            use_color: std::env::var_os("NO_COLOR").is_none(),
            use_emoji: std::env::var_os("NO_EMOJI").is_none(),
            term_width: width,
            padding: 1,
        }
    }

    /// No colour, no emoji, fixed width. Used for tests and piped output.
    pub fn plain() -> Self {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width: 100,
            padding: 1,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Color / Emoji                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Secondary,
    Success,
    Warning,
    Error,
    Dim,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",    // cyan
        Role::Secondary => "38;5;250", // gray
        Role::Success => "38;5;82",    // green
        Role::Warning => "38;5;214",   // orange
        Role::Error => "38;5;196",     // red
        Role::Dim => "2",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "request" => "➜",
        "success" => "✔",
        "error" => "✖",
        "warn" => "⚠",
        "info" => "ℹ",
        _ => "",
    }
}

/// `"<glyph> <text>"`, or just the text when emoji are off.
pub fn tagged(tag: &str, text: impl AsRef<str>, style: &StyleOptions) -> String {
    match emoji(tag, style) {
        "" => text.as_ref().to_string(),
        glyph => format!("{glyph} {}", text.as_ref()),
    }
}

/* -------------------------------------------------------------------------- */
/* Box Header                                                                 */
/* -------------------------------------------------------------------------- */

/// Framed title line with an optional subtitle, wrapped to the style width.
pub fn box_header(
    title: impl AsRef<str>,
    subtitle: Option<impl AsRef<str>>,
    title_role: Role,
    style: &StyleOptions,
) -> String {
    let (h, v, tl, tr, bl, br) = ('─', '│', '┌', '┐', '└', '┘');

    let title_styled = color(title_role, title.as_ref(), style);
    let inner = match subtitle {
        Some(sub) => format!(
            "{title_styled}  {}",
            color(Role::Secondary, sub.as_ref(), style)
        ),
        None => title_styled,
    };

    let max_inner = style
        .term_width
        .clamp(20, 200)
        .saturating_sub(2 + style.padding * 2);
    let lines = wrap_text(&inner, max_inner);
    let content_width = lines.iter().map(|l| display_width(l)).max().unwrap_or(0);
    let span = content_width + style.padding * 2;
    let pad = " ".repeat(style.padding);
    let rule = h.to_string().repeat(span);

    let mut out = Vec::with_capacity(lines.len() + 2);
    out.push(format!("{tl}{rule}{tr}"));
    for line in &lines {
        let fill = " ".repeat(content_width - display_width(line));
        out.push(format!("{v}{pad}{line}{fill}{pad}{v}"));
    }
    out.push(format!("{bl}{rule}{br}"));
    out.join("\n")
}

/* -------------------------------------------------------------------------- */
/* Text Helpers                                                               */
/* -------------------------------------------------------------------------- */

/// Greedy word wrap on visible width. A single word longer than the limit
/// gets a line of its own.
pub fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        let needed = display_width(&current) + display_width(word) + 1;
        if !current.is_empty() && needed > max_width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/* -------------------------------------------------------------------------- */
/* ANSI / Width Utilities                                                     */
/* -------------------------------------------------------------------------- */

pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    // Scans for ESC '[' ... <letter>
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut buf = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for t in chars.by_ref() {
                if t.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        buf.push(c);
    }
    Cow::Owned(buf)
}

pub fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

/* -------------------------------------------------------------------------- */
/* Tests                                                                      */
/* -------------------------------------------------------------------------- */
