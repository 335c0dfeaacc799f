//! The one resume template this tool writes for, `mcdowellcv`.
//!
//! Generated markup is only the document body: header macros plus the
//! section environments. The fixed preamble and document wrapper are added
//! by [`ResumeTemplate::assemble`], so the model never has to get them right.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::util::excerpt;

static ENVIRONMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(begin|end)\s*\{([^{}]*)\}").expect("environment pattern is valid")
});

static LIST_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(begin|end)\s*\{\s*itemize\s*\}|\\item\b").expect("list token pattern is valid")
});

const PREAMBLE: &str = r"% Resume Template
\documentclass[]{mcdowellcv}

\usepackage{amsmath}
\usepackage{hyperref}
\usepackage{multicol}

\setlength{\parskip}{1.3em}
";

const FORBIDDEN: &[&str] = &[
    r"\documentclass",
    r"\begin{document}",
    r"\end{document}",
    r"\makeheader",
];

/// A structural rule the body breaks, with the text around the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub message: String,
    pub excerpt: String,
}

impl Violation {
    fn at(text: &str, pos: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            excerpt: excerpt(text, pos),
        }
    }

    fn missing(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            excerpt: String::new(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.excerpt.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (near: {})", self.message, self.excerpt)
        }
    }
}

/// Structural requirements and assembly for the resume document.
#[derive(Debug, Clone, Copy)]
pub struct ResumeTemplate {
    /// Header macros, each on its own line, moved to the preamble.
    pub header_macros: &'static [&'static str],
    /// Section titles that must each open a `cvsection`.
    pub required_sections: &'static [&'static str],
    pub max_bullets: usize,
}

impl ResumeTemplate {
    pub const fn mcdowell() -> Self {
        Self {
            header_macros: &[r"\name", r"\address", r"\contacts"],
            required_sections: &["Summary", "Skills", "Work Experience"],
            max_bullets: 3,
        }
    }

    /// First structural problem in `body`, if any.
    pub fn check(&self, body: &str) -> Result<(), Violation> {
        if body.trim().is_empty() {
            return Err(Violation::missing("body is empty"));
        }
        for wrapper in FORBIDDEN {
            if let Some(pos) = body.find(wrapper) {
                return Err(Violation::at(
                    body,
                    pos,
                    format!("{wrapper} is added by the template and must not appear in the body"),
                ));
            }
        }

        let masked = scan(body)?;
        check_environments(body, &masked)?;
        check_bullets(body, &masked, self.max_bullets)?;

        let header_lines: Vec<&str> = masked
            .lines()
            .map(str::trim_start)
            .filter(|l| self.is_header_line(l))
            .collect();
        if !header_lines.iter().any(|l| l.starts_with(r"\name{")) {
            return Err(Violation::missing(r"missing \name{...} header"));
        }
        if let Some(line) = header_lines.iter().find(|l| scan(l).is_err()) {
            return Err(Violation {
                message: "header macro must open and close on one line".into(),
                excerpt: line.trim().to_string(),
            });
        }

        let compact: String = masked.chars().filter(|c| !c.is_whitespace()).collect();
        for section in self.required_sections {
            let title: String = section.chars().filter(|c| !c.is_whitespace()).collect();
            if !compact.contains(&format!(r"\begin{{cvsection}}{{{title}}}")) {
                return Err(Violation::missing(format!(
                    r"missing required section \begin{{cvsection}}{{{section}}}"
                )));
            }
        }
        Ok(())
    }

    /// The complete `.tex` source for a body that passed [`Self::check`].
    pub fn assemble(&self, body: &str) -> String {
        let (header, content): (Vec<&str>, Vec<&str>) = body
            .lines()
            .partition(|l| self.is_header_line(l.trim_start()));

        let mut out = String::from(PREAMBLE);
        out.push('\n');
        for line in header {
            out.push_str(line.trim());
            out.push('\n');
        }
        out.push_str("\n\\begin{document}\n\n\\makeheader\n\n\\vspace{-2.0em}\n\n");
        out.push_str(content.join("\n").trim());
        out.push_str("\n\n\\end{document}\n");
        out
    }

    /// Instructions that go into every generation prompt.
    pub fn authoring_guide(&self) -> String {
        format!(
            r"Write only the body of a LaTeX resume for the mcdowellcv document class.
Rules:
- Do not write \documentclass, \usepackage, \begin{{document}}, \end{{document}} or \makeheader; they are added for you.
- Start with the header macros, one per line: \name{{...}}, \address{{...}} (address, phone and email joined with \textbullet{{}}), \contacts{{...}} (\href{{url}}{{label}} entries joined with \textbullet{{}}).
- Then these sections, in order, each as \begin{{cvsection}}{{Title}} ... \end{{cvsection}}: {sections}.
- Skills: one line per group, formatted as \textbf{{Group}}: skill, skill \\
- Work Experience: for each role, \textbf{{Job Title}} \\ then Company, Location \textbullet{{}} Start--End, then an itemize with at most {bullets} \item bullets.
- Write dates like May '25.
- No math mode: never use $, \( or \[. Escape literal $, %, &, # and _ with a backslash.
- Every {{ must be closed and every \begin{{...}} must have a matching \end{{...}}.
- For any requirement of the job the experience does not support, add a line `% GAP: <requirement>` instead of inventing experience.",
            sections = self.required_sections.join(", "),
            bullets = self.max_bullets,
        )
    }

    fn is_header_line(&self, line: &str) -> bool {
        self.header_macros
            .iter()
            .any(|m| line.strip_prefix(m).is_some_and(|rest| rest.starts_with('{')))
    }
}

impl Default for ResumeTemplate {
    fn default() -> Self {
        Self::mcdowell()
    }
}

/// Walk the markup once: reject math mode and unbalanced braces, and return
/// a copy with comments blanked out (same byte offsets).
fn scan(body: &str) -> Result<String, Violation> {
    let mut masked = String::with_capacity(body.len());
    let mut open: Vec<usize> = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '\\' => {
                masked.push(c);
                match chars.peek() {
                    Some(&(_, '(' | '[')) => {
                        return Err(Violation::at(body, pos, "math mode is not allowed"));
                    }
                    // Control symbols: \\ \{ \} \$ \% \& \# \_ and friends.
                    Some(&(_, next)) if next.is_ascii_punctuation() || next == ' ' => {
                        masked.push(next);
                        chars.next();
                    }
                    _ => {}
                }
            }
            '%' => {
                masked.push(' ');
                while let Some(&(_, next)) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    masked.extend(std::iter::repeat_n(' ', next.len_utf8()));
                    chars.next();
                }
            }
            '$' => return Err(Violation::at(body, pos, "math mode is not allowed")),
            '{' => {
                open.push(pos);
                masked.push(c);
            }
            '}' => {
                if open.pop().is_none() {
                    return Err(Violation::at(body, pos, "unmatched '}'"));
                }
                masked.push(c);
            }
            _ => masked.push(c),
        }
    }

    match open.last() {
        Some(&pos) => Err(Violation::at(body, pos, "unclosed '{'")),
        None => Ok(masked),
    }
}

fn check_environments(body: &str, masked: &str) -> Result<(), Violation> {
    let mut stack: Vec<(String, usize)> = Vec::new();
    for caps in ENVIRONMENT.captures_iter(masked) {
        let pos = caps.get(0).map_or(0, |m| m.start());
        let name = caps[2].trim().to_string();
        if &caps[1] == "begin" {
            stack.push((name, pos));
            continue;
        }
        match stack.pop() {
            Some((open, _)) if open == name => {}
            Some((open, _)) => {
                return Err(Violation::at(
                    body,
                    pos,
                    format!(r"\end{{{name}}} closes \begin{{{open}}}"),
                ));
            }
            None => {
                return Err(Violation::at(
                    body,
                    pos,
                    format!(r"\end{{{name}}} without \begin{{{name}}}"),
                ));
            }
        }
    }
    match stack.pop() {
        Some((open, pos)) => Err(Violation::at(body, pos, format!(r"unclosed \begin{{{open}}}"))),
        None => Ok(()),
    }
}

/// No list may carry more than `max` items. Environments are already
/// known to balance.
fn check_bullets(body: &str, masked: &str, max: usize) -> Result<(), Violation> {
    let mut lists: Vec<(usize, usize)> = Vec::new();
    for caps in LIST_TOKEN.captures_iter(masked) {
        let pos = caps.get(0).map_or(0, |m| m.start());
        match caps.get(1).map(|m| m.as_str()) {
            Some("begin") => lists.push((pos, 0)),
            Some(_) => {
                if let Some((start, items)) = lists.pop() {
                    if items > max {
                        return Err(Violation::at(
                            body,
                            start,
                            format!("{items} bullets in one list, at most {max} allowed"),
                        ));
                    }
                }
            }
            None => {
                if let Some((_, items)) = lists.last_mut() {
                    *items += 1;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) const SAMPLE_BODY: &str = r"\name{Ada Lovelace}
\address{London \textbullet{} +44 20 0000 \textbullet{} ada@example.com}
\contacts{\href{https://github.com/ada}{github.com/ada}}

\begin{cvsection}{Summary}
  Backend engineer with 5 years of Go and distributed systems.
\end{cvsection}

\vspace{-1.0em}

\begin{cvsection}{Skills}
  \textbf{Languages}: Go, Rust, SQL \\
\end{cvsection}

\begin{cvsection}{Work Experience}
  \textbf{Senior Engineer}  \\
  Globex, Remote \textbullet{} May '21--Present
  \begin{itemize}
    \item Cut p99 latency by 40\% on the payments API.
    \item Ran a 12-node Kafka cluster.
  \end{itemize}
\end{cvsection}";
