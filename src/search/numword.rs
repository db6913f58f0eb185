//! Spelled-out number normalization
//!
//! Instant answer math handles digits much better than words, so a
//! transcript like "two plus two" becomes "2 plus 2" before the query
//! goes out. Number words combine per English construction rules;
//! every other word passes through untouched.

/// Value classes a word can contribute to a number run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumWord {
    /// zero through nine
    Unit(u64),
    /// ten through nineteen
    Teen(u64),
    /// twenty, thirty, ... ninety
    Tens(u64),
    Hundred,
    /// thousand, million, billion
    Scale(u64),
    /// in-run connector, as in "one hundred and five"
    And,
}

fn classify(word: &str) -> Option<NumWord> {
    let lower = word.to_ascii_lowercase();
    let class = match lower.as_str() {
        "zero" => NumWord::Unit(0),
        "one" => NumWord::Unit(1),
        "two" => NumWord::Unit(2),
        "three" => NumWord::Unit(3),
        "four" => NumWord::Unit(4),
        "five" => NumWord::Unit(5),
        "six" => NumWord::Unit(6),
        "seven" => NumWord::Unit(7),
        "eight" => NumWord::Unit(8),
        "nine" => NumWord::Unit(9),
        "ten" => NumWord::Teen(10),
        "eleven" => NumWord::Teen(11),
        "twelve" => NumWord::Teen(12),
        "thirteen" => NumWord::Teen(13),
        "fourteen" => NumWord::Teen(14),
        "fifteen" => NumWord::Teen(15),
        "sixteen" => NumWord::Teen(16),
        "seventeen" => NumWord::Teen(17),
        "eighteen" => NumWord::Teen(18),
        "nineteen" => NumWord::Teen(19),
        "twenty" => NumWord::Tens(20),
        "thirty" => NumWord::Tens(30),
        "forty" => NumWord::Tens(40),
        "fifty" => NumWord::Tens(50),
        "sixty" => NumWord::Tens(60),
        "seventy" => NumWord::Tens(70),
        "eighty" => NumWord::Tens(80),
        "ninety" => NumWord::Tens(90),
        "hundred" => NumWord::Hundred,
        "thousand" => NumWord::Scale(1_000),
        "million" => NumWord::Scale(1_000_000),
        "billion" => NumWord::Scale(1_000_000_000),
        "and" => NumWord::And,
        _ => return None,
    };
    Some(class)
}

/// Whether `next` can legally continue a run whose last value word was
/// `last` (None means the run is empty). "and" is transparent here:
/// legality is always checked against the last value word.
fn can_follow(last: Option<NumWord>, next: NumWord) -> bool {
    use NumWord::*;

    let Some(prev) = last else {
        // A run starts with a small number, never with a multiplier
        return matches!(next, Unit(_) | Teen(_) | Tens(_));
    };

    match (prev, next) {
        // "twenty one" .. "ninety nine"; "twenty zero" is two numbers
        (Tens(_), Unit(n)) => n > 0,
        // a multiplier opens a fresh remainder group
        (Hundred, Unit(_) | Teen(_) | Tens(_)) => true,
        (Scale(_), Unit(_) | Teen(_) | Tens(_)) => true,
        // "one hundred", "nineteen hundred"; "zero hundred" is not a number
        (Unit(n), Hundred) => n > 0,
        (Teen(_), Hundred) => true,
        (Unit(_) | Teen(_) | Tens(_) | Hundred, Scale(_)) => true,
        _ => false,
    }
}

/// A run of number words being folded into one value
#[derive(Debug, Default)]
struct NumberRun {
    /// closed, already-scaled groups
    total: u64,
    /// group still under construction
    current: u64,
    last: Option<NumWord>,
    pending_and: bool,
    has_value: bool,
}

impl NumberRun {
    /// Try to extend the run. `false` means the word does not legally
    /// continue this number; the caller flushes and retries.
    fn push(&mut self, word: NumWord) -> bool {
        if matches!(word, NumWord::And) {
            if !self.has_value || self.pending_and {
                return false;
            }
            self.pending_and = true;
            return true;
        }

        if !can_follow(self.last, word) {
            return false;
        }

        self.pending_and = false;
        match word {
            NumWord::Unit(n) | NumWord::Teen(n) | NumWord::Tens(n) => self.current += n,
            NumWord::Hundred => self.current *= 100,
            NumWord::Scale(scale) => {
                self.total += self.current * scale;
                self.current = 0;
            }
            NumWord::And => unreachable!("handled above"),
        }
        self.last = Some(word);
        self.has_value = true;
        true
    }

    /// Emit the folded value (and a trailing unconsumed "and") and
    /// reset for the next run.
    fn flush_into(&mut self, out: &mut Vec<String>) {
        if self.has_value {
            out.push((self.total + self.current).to_string());
            if self.pending_and {
                out.push("and".to_string());
            }
        }
        *self = Self::default();
    }
}

/// Split a token into its number words. Hyphenated compounds like
/// "twenty-five" count only when every part is a number word; mixed
/// tokens are left alone.
fn number_words(token: &str) -> Vec<(&str, NumWord)> {
    let parts: Vec<&str> = if token.contains('-') {
        token.split('-').collect()
    } else {
        vec![token]
    };

    let mut words = Vec::with_capacity(parts.len());
    for part in parts {
        match classify(part) {
            Some(class) => words.push((part, class)),
            None => return Vec::new(),
        }
    }
    words
}

/// Replace spelled-out number runs with digit strings. Other words
/// pass through in order; whitespace collapses to single spaces.
pub fn normalize(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut run = NumberRun::default();

    for token in text.split_whitespace() {
        let words = number_words(token);
        if words.is_empty() {
            run.flush_into(&mut out);
            out.push(token.to_string());
            continue;
        }

        for (spelling, word) in words {
            loop {
                if run.push(word) {
                    break;
                }
                if !run.has_value {
                    // a connector or bare multiplier that cannot start
                    // a run stays literal
                    out.push(spelling.to_string());
                    break;
                }
                run.flush_into(&mut out);
            }
        }
    }

    run.flush_into(&mut out);
    out.join(" ")
}
