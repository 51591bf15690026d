//! A keyword-based [`Classifier`] for free-text help requests.
//!
//! Each category owns a small vocabulary; the category with the most hits
//! wins and its share of all hits is the confidence. Alarm words raise the
//! urgency from a neutral baseline. Text with no recognisable words falls
//! back to a configured category with zero confidence.

use std::{convert::Infallible, future::Future};

use helpnet_core::{
  collab::{Classification, Classifier},
  help::{HelpCategory, Urgency},
};

const BASELINE_URGENCY: f64 = 5.0;
const ALARM_STEP: f64 = 2.0;

const VOCABULARY: &[(HelpCategory, &[&str])] = &[
  (HelpCategory::Food, &[
    "food", "groceries", "grocery", "meal", "meals", "hungry", "eat", "bread", "cook", "dinner",
    "lunch",
  ]),
  (HelpCategory::Health, &[
    "doctor", "medicine", "medication", "pharmacy", "sick", "ill", "hospital", "injury", "injured",
    "nurse", "health",
  ]),
  (HelpCategory::Shelter, &[
    "shelter", "housing", "roof", "homeless", "evicted", "sleep", "bed", "apartment", "room",
    "flat",
  ]),
  (HelpCategory::Education, &[
    "homework", "school", "tutor", "tutoring", "lesson", "lessons", "study", "exam", "learn",
    "teach", "reading",
  ]),
  (HelpCategory::Climate, &[
    "flood", "flooding", "heatwave", "storm", "wildfire", "drought", "cleanup", "trees", "climate",
    "recycling",
  ]),
  (HelpCategory::Finance, &[
    "rent", "money", "bills", "bill", "debt", "loan", "budget", "bank", "paperwork", "benefits",
    "taxes",
  ]),
];

const ALARM_WORDS: &[&str] = &[
  "urgent", "emergency", "immediately", "asap", "now", "danger", "bleeding", "fire", "tonight",
  "stranded",
];

#[derive(Debug, Clone, Copy)]
pub struct KeywordClassifier {
  fallback: HelpCategory,
}

impl Default for KeywordClassifier {
  fn default() -> Self { Self { fallback: HelpCategory::Food } }
}

impl KeywordClassifier {
  pub fn with_fallback(fallback: HelpCategory) -> Self { Self { fallback } }

  pub fn classify_text(&self, text: &str) -> Classification {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
      .split(|c: char| !c.is_alphanumeric())
      .filter(|w| !w.is_empty())
      .collect();

    let hits = |vocab: &[&str]| words.iter().filter(|w| vocab.contains(*w)).count();

    // First category wins ties, in vocabulary order.
    let mut best = (self.fallback, 0usize);
    let mut total = 0usize;
    for (category, vocab) in VOCABULARY {
      let n = hits(*vocab);
      total += n;
      if n > best.1 {
        best = (*category, n);
      }
    }

    let confidence = if total == 0 { 0.0 } else { best.1 as f64 / total as f64 };
    let alarms = hits(ALARM_WORDS) as f64;
    Classification {
      category: best.0,
      urgency: Urgency::saturating(BASELINE_URGENCY + ALARM_STEP * alarms),
      confidence,
    }
  }
}

impl Classifier for KeywordClassifier {
  type Error = Infallible;

  fn classify<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Classification, Self::Error>> + Send + 'a {
    async move { Ok(self.classify_text(text)) }
  }
}
