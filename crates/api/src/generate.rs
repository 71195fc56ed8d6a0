//! Random quizzes assembled from a corpus of question/answer variants.

use db::{CorpusEntry, NewHint, NewQuestion};
use rand::{
    seq::{IndexedRandom, SliceRandom},
    Rng,
};

const DISTRACTORS: usize = 3;

fn shares_tag(a: &CorpusEntry, b: &CorpusEntry) -> bool {
    a.tags.iter().any(|tag| b.tags.contains(tag))
}

/// Wrong options for `entry`, preferring answers of entries that share a tag with it.
fn distractors<R: Rng + ?Sized>(entries: &[&CorpusEntry], entry: &CorpusEntry, answer: &str, rng: &mut R) -> Vec<String> {
    let others = entries.iter().copied().filter(|other| !core::ptr::eq(*other, entry));
    let (mut related, mut unrelated): (Vec<_>, Vec<_>) = others.partition(|other| shares_tag(entry, other));
    related.shuffle(rng);
    unrelated.shuffle(rng);

    let mut picked = Vec::with_capacity(DISTRACTORS);
    for other in related.into_iter().chain(unrelated) {
        if picked.len() == DISTRACTORS {
            break;
        }
        let Some(candidate) = other.answer_variants.choose(rng) else {
            continue;
        };
        if candidate != answer && !picked.contains(candidate) {
            picked.push(candidate.clone());
        }
    }
    picked
}

/// Builds up to `count` questions worth `points` each. Entries lacking question or answer
/// variants are never used.
pub fn generate<R: Rng + ?Sized>(entries: &[CorpusEntry], count: usize, points: u32, rng: &mut R) -> Vec<NewQuestion> {
    let usable: Vec<_> =
        entries.iter().filter(|entry| !entry.question_variants.is_empty() && !entry.answer_variants.is_empty()).collect();
    let chosen: Vec<_> = usable.choose_multiple(rng, count).copied().collect();

    chosen
        .into_iter()
        .filter_map(|entry| {
            let text = entry.question_variants.choose(rng)?.clone();
            let answer = entry.answer_variants.choose(rng)?.clone();

            let mut options = distractors(&usable, entry, &answer, rng);
            options.push(answer.clone());
            options.shuffle(rng);
            let answer = options.iter().position(|option| *option == answer)?;

            let hints = entry
                .hint_titles
                .iter()
                .zip(&entry.hint_variants)
                .map(|(title, text)| NewHint { title: title.clone(), text: text.clone() })
                .collect();
            Some(NewQuestion { text, options, answer, points, time_limit: None, image: None, image_alt: None, hints })
        })
        .collect()
}
