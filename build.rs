// ========================================================================================
//
//                               Source hygiene checks
//
// ========================================================================================
//
// Every `.rs` file under the crate's source directories is searched line by line
// against a small set of rules. Any hit fails the build with the offending lines.

use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use walkdir::WalkDir;

const SOURCE_DIRS: [&str; 6] = ["score", "vcf", "shared", "src", "tests", "benches"];

/// One forbidden pattern. `applies` decides whether a regex hit on a line is a real
/// violation once comments and string literals are taken into account.
struct Rule {
    name: &'static str,
    pattern: &'static str,
    applies: fn(&str) -> bool,
    advice: &'static str,
}

const RULES: [Rule; 4] = [
    Rule {
        name: "underscore-prefixed identifier",
        pattern: r"\b_[a-zA-Z0-9_]+\b",
        applies: outside_comment_and_string,
        advice: "Use the binding under its real name or remove it.",
    },
    Rule {
        name: "edit-history marker in a comment",
        pattern: r"//.*\b(?:FIXED|FIXES|FIX|CORRECTED|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)\b",
        applies: always,
        advice: "Comments describe the code as it is, not how it got there.",
    },
    Rule {
        name: "shouting comment",
        pattern: r"//",
        applies: comment_is_all_caps,
        advice: "Write the comment in sentence case or delete it.",
    },
    Rule {
        name: "allow(dead_code)",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        applies: always,
        advice: "Use the item or delete it.",
    },
];

fn always(_: &str) -> bool {
    true
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed
        .starts_with("//")
        .then(|| trimmed.trim_start_matches(['/', '!']).trim())
}

fn outside_comment_and_string(line: &str) -> bool {
    if comment_text(line).is_some() {
        return false;
    }
    // Odd-numbered segments between double quotes are string contents.
    !line
        .split('"')
        .enumerate()
        .any(|(index, segment)| index % 2 == 1 && segment.contains('_'))
}

fn comment_is_all_caps(line: &str) -> bool {
    comment_text(line).is_some_and(|text| {
        let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
        letters.peek().is_some() && letters.all(char::is_uppercase)
    })
}

struct Hits<'r> {
    rule: &'r Rule,
    lines: Vec<String>,
}

impl Sink for Hits<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let text = String::from_utf8_lossy(mat.bytes());
        let text = text.trim_end();
        if (self.rule.applies)(text) {
            self.lines
                .push(format!("{}:{text}", mat.line_number().unwrap_or(0)));
        }
        Ok(true)
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check_file(path: &Path, searcher: &mut Searcher) -> Result<Vec<String>, Box<dyn Error>> {
    let mut report = Vec::new();
    for rule in &RULES {
        let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
        let mut hits = Hits {
            rule,
            lines: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut hits)?;
        if !hits.lines.is_empty() {
            report.push(format!(
                "{} ({} hit(s)) in {}:\n   {}\n   {}",
                rule.name,
                hits.lines.len(),
                path.display(),
                hits.lines.join("\n   "),
                rule.advice
            ));
        }
    }
    Ok(report)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let mut searcher = Searcher::new();
    let mut report = Vec::new();
    for path in rust_sources() {
        match check_file(&path, &mut searcher) {
            Ok(found) => report.extend(found),
            Err(e) => {
                eprintln!("Error: source check of {} failed: {e}", path.display());
                process::exit(1);
            }
        }
    }

    if !report.is_empty() {
        eprintln!("\nSource hygiene check failed:\n\n{}\n", report.join("\n\n"));
        process::exit(1);
    }
}
