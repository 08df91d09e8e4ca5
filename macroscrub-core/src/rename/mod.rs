//! Obfuscated identifier detection and renaming over macro source text

use crate::config::RenameConfig;
use crate::vba::MacroModule;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Vowels for the readability check; accented forms cover Spanish-locale
/// identifiers.
const VOWELS: [char; 10] = ['a', 'e', 'i', 'o', 'u', 'á', 'é', 'í', 'ó', 'ú'];

/// Identifiers containing this letter are left alone regardless of the
/// heuristic outcome.
const EXCLUDED_LETTER: char = 'ñ';

/// Minimum token length before the heuristic applies.
const MIN_TOKEN_LEN: usize = 9;

/// Trailing comment appended by the annotation pass.
const FLAG_COMMENT: &str = "' [flagged for review]";

/// Category an obfuscated token is bucketed into, by prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Module,
    Function,
    Variable,
}

impl Category {
    fn label(self) -> &'static str {
        match self {
            Category::Module => "module",
            Category::Function => "function",
            Category::Variable => "variable",
        }
    }

    /// Prefix test. Only vowel-free prefixes can occur in a token that
    /// passed the heuristic.
    fn of(token: &str) -> Self {
        let lower = token.to_lowercase();
        if lower.starts_with("mdl") {
            Category::Module
        } else if lower.starts_with("fn") || lower.starts_with("sb") {
            Category::Function
        } else {
            Category::Variable
        }
    }
}

/// One applied token replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameEntry {
    pub original: String,
    pub replacement: String,
    pub category: Category,
}

/// A module's rewritten source; the input [`MacroModule`] is untouched.
#[derive(Debug, Clone, Serialize)]
pub struct RenamedModule {
    pub filename: String,
    pub code: String,
}

/// Aggregated result of one renaming pass over a module set
#[derive(Debug, Default, Clone, Serialize)]
pub struct RenameOutcome {
    pub modules: Vec<RenamedModule>,
    pub entries: Vec<RenameEntry>,
    pub annotated_lines: usize,
    pub relabeled_routines: usize,
}

/// Name registry for one renaming pass: assigned tokens, taken names and
/// per-category counters. Threaded through the pass, never global.
#[derive(Debug, Default)]
struct RenameContext {
    assigned: HashMap<String, String>,
    used_names: HashSet<String>,
    counters: HashMap<Category, usize>,
}

impl RenameContext {
    /// Next free generated name for a category. The counter only moves
    /// forward, even when a candidate was already taken.
    fn next_name(&mut self, category: Category) -> String {
        let counter = self.counters.entry(category).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}{}", category.label(), counter);
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Renaming engine with its token scanner precompiled
pub struct Renamer {
    config: RenameConfig,
    word_pattern: Regex,
    flag_pattern: Regex,
    routine_pattern: Regex,
}

impl Renamer {
    pub fn new(config: RenameConfig) -> Self {
        Self {
            config,
            word_pattern: Regex::new(r"\b\p{L}{9,}\b").unwrap(),
            flag_pattern: Regex::new(r"(?i)^\s*(On Error|GoTo|Call|Shell|CreateObject)\b")
                .unwrap(),
            routine_pattern: Regex::new(r"\b(?i)(Sub|Function)[ \t]+([a-z]{1,2}[0-9]{1,3})\b")
                .unwrap(),
        }
    }

    /// Run the configured passes over every module, in input order, with
    /// one shared name registry. Deterministic for a fixed input.
    pub fn rename_modules(&self, modules: &[MacroModule]) -> RenameOutcome {
        let mut outcome = RenameOutcome::default();
        let mut context = RenameContext::default();
        let mut routine_counter = 0usize;

        for module in modules {
            let mut code = module.code.clone();

            if self.config.rename_identifiers {
                code = self.rename_code(&code, &mut context, &mut outcome.entries);
            }
            if self.config.annotate_lines {
                let (annotated, count) = self.annotate_code(&code);
                code = annotated;
                outcome.annotated_lines += count;
            }
            if self.config.relabel_routines {
                let (relabeled, count) = self.relabel_routines(&code, &mut routine_counter);
                code = relabeled;
                outcome.relabeled_routines += count;
            }

            outcome.modules.push(RenamedModule {
                filename: module.filename.clone(),
                code,
            });
        }

        outcome
    }

    /// Replace every whole-word occurrence of each obfuscated token with a
    /// generated name. Tokens are processed in first-occurrence order.
    fn rename_code(
        &self,
        code: &str,
        context: &mut RenameContext,
        entries: &mut Vec<RenameEntry>,
    ) -> String {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for token in self.word_pattern.find_iter(code) {
            let token = token.as_str();
            if seen.insert(token.to_string()) && is_obfuscated(token) {
                targets.push(token.to_string());
            }
        }

        let mut rewritten = code.to_string();
        for token in targets {
            let replacement = match context.assigned.get(&token) {
                Some(existing) => existing.clone(),
                None => {
                    let category = Category::of(&token);
                    let name = context.next_name(category);
                    context.assigned.insert(token.clone(), name.clone());
                    entries.push(RenameEntry {
                        original: token.clone(),
                        replacement: name.clone(),
                        category,
                    });
                    name
                }
            };
            let word = Regex::new(&format!(r"\b{}\b", regex::escape(&token))).unwrap();
            rewritten = word.replace_all(&rewritten, replacement.as_str()).into_owned();
        }
        rewritten
    }

    /// Append a trailing comment flag to error-handling, indirection and
    /// shell lines. Already flagged lines are left alone, so re-running is
    /// a no-op.
    fn annotate_code(&self, code: &str) -> (String, usize) {
        let mut count = 0usize;
        let lines: Vec<String> = split_lines(code)
            .into_iter()
            .map(|line| {
                if self.flag_pattern.is_match(&line) && !line.trim_end().ends_with(FLAG_COMMENT) {
                    count += 1;
                    format!("{} {}", line.trim_end(), FLAG_COMMENT)
                } else {
                    line
                }
            })
            .collect();
        if count == 0 {
            return (code.to_string(), 0);
        }
        (join_lines(code, lines), count)
    }

    /// Give routine definitions that still carry a cryptic short name a
    /// sequential label. Definition site only; applied after renaming.
    fn relabel_routines(&self, code: &str, counter: &mut usize) -> (String, usize) {
        let mut count = 0usize;
        let relabeled = self
            .routine_pattern
            .replace_all(code, |caps: &regex::Captures<'_>| {
                *counter += 1;
                count += 1;
                format!("{} MainRoutine{}", &caps[1], counter)
            })
            .into_owned();
        (relabeled, count)
    }
}

/// Heuristic readability check: a long, all-letter, vowel-free, fully
/// lowercase token is judged obfuscated. Tokens carrying the excluded
/// letter are never renamed.
pub fn is_obfuscated(token: &str) -> bool {
    if token.chars().count() < MIN_TOKEN_LEN {
        return false;
    }
    if !token.chars().all(char::is_alphabetic) {
        return false;
    }
    if token.contains(EXCLUDED_LETTER) {
        return false;
    }
    let lower = token.to_lowercase();
    if VOWELS.iter().any(|&v| lower.contains(v)) {
        return false;
    }
    token.chars().all(char::is_lowercase)
}

fn split_lines(code: &str) -> Vec<String> {
    code.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Re-join with the dominant line ending of the original text.
fn join_lines(original: &str, lines: Vec<String>) -> String {
    let ending = if original.contains("\r\n") { "\r\n" } else { "\n" };
    lines.join(ending)
}
