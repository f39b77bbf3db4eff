//! The skill activation algorithm (spec §4.D `match`).
//!
//! Every enabled skill is scored against the user's input. Skills with at
//! least one firing trigger are scored directly; skills with none fall back
//! to an embedding-cosine check and then a token-overlap check. Results are
//! sorted by confidence, highest first.

use sa_domain::skill::{Skill, SkillMatch, TriggerType};

/// Turns text into a fixed-length vector. Implemented by whatever embedder
/// the host process already has wired up (kept decoupled from `sa-memory`
/// so this crate doesn't need to depend on it).
pub trait SkillEmbedder: Send + Sync {
    fn embed_one(&self, text: &str) -> Vec<f32>;
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Direct trigger scoring for one skill. Returns `None` if no trigger fires.
fn score_triggers(skill: &Skill, input_lower: &str) -> Option<(f32, String)> {
    let mut best: Option<(f32, String)> = None;

    for trigger in &skill.triggers {
        let hit = match trigger.kind {
            TriggerType::Always => Some((0.1, "always".to_string())),
            TriggerType::Keyword => {
                let total = trigger.patterns.len().max(1);
                let matched = trigger
                    .patterns
                    .iter()
                    .filter(|p| input_lower.contains(&p.to_lowercase()))
                    .count();
                if matched > 0 {
                    let confidence = ((matched as f32 / total as f32) * 0.8 + 0.2).max(0.5);
                    Some((confidence, format!("keyword:{}", trigger.patterns.join(","))))
                } else {
                    None
                }
            }
            TriggerType::Intent => {
                let fired = trigger
                    .patterns
                    .iter()
                    .any(|p| input_lower.contains(&p.to_lowercase()));
                if fired {
                    Some((
                        trigger.confidence.unwrap_or(0.5),
                        format!("intent:{}", trigger.patterns.join(",")),
                    ))
                } else {
                    None
                }
            }
        };

        if let Some((confidence, label)) = hit {
            if best.as_ref().map(|(c, _)| confidence > *c).unwrap_or(true) {
                best = Some((confidence, label));
            }
        }
    }

    best
}

/// Latin words (>=2 alnum chars) plus CJK bigrams, lowercased.
fn overlap_tokens(text: &str) -> std::collections::HashSet<String> {
    let mut tokens = std::collections::HashSet::new();
    let mut word = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_alphanumeric() && (c as u32) < 0x3000 {
            word.push(c.to_ascii_lowercase());
        } else {
            if word.chars().count() >= 2 {
                tokens.insert(std::mem::take(&mut word));
            } else {
                word.clear();
            }
            if is_cjk(c) {
                if i + 1 < chars.len() && is_cjk(chars[i + 1]) {
                    tokens.insert(format!("{}{}", c, chars[i + 1]));
                }
            }
        }
        i += 1;
    }
    if word.chars().count() >= 2 {
        tokens.insert(word);
    }
    tokens
}

fn is_cjk(c: char) -> bool {
    let u = c as u32;
    (0x4E00..=0x9FFF).contains(&u) || (0x3040..=0x30FF).contains(&u) || (0xAC00..=0xD7A3).contains(&u)
}

fn token_overlap_score(input_tokens: &std::collections::HashSet<String>, corpus: &str) -> f32 {
    let corpus_tokens = overlap_tokens(corpus);
    if input_tokens.is_empty() || corpus_tokens.is_empty() {
        return 0.0;
    }
    let shared = input_tokens.intersection(&corpus_tokens).count();
    let denom = input_tokens.len().min(corpus_tokens.len());
    if denom == 0 {
        0.0
    } else {
        shared as f32 / denom as f32
    }
}

/// Score every enabled skill against `input`, sorted by confidence descending.
pub fn match_input(
    skills: &[Skill],
    input: &str,
    embedder: Option<&dyn SkillEmbedder>,
    embedding_threshold: f32,
    token_overlap_threshold: f32,
) -> Vec<SkillMatch> {
    let input_lower = input.to_lowercase();
    let input_embedding = embedder.map(|e| e.embed_one(input));
    let input_tokens = overlap_tokens(input);

    let mut matches = Vec::new();

    for skill in skills.iter().filter(|s| s.enabled) {
        if let Some((confidence, matched_trigger)) = score_triggers(skill, &input_lower) {
            matches.push(SkillMatch {
                skill: skill.clone(),
                confidence,
                matched_trigger,
            });
            continue;
        }

        let corpus = format!("{} {}", skill.description, skill.instructions);

        if let (Some(embedder), Some(input_vec)) = (embedder, input_embedding.as_ref()) {
            let skill_vec = embedder.embed_one(&corpus);
            let score = cosine(input_vec, &skill_vec);
            if score > embedding_threshold {
                matches.push(SkillMatch {
                    skill: skill.clone(),
                    confidence: score,
                    matched_trigger: "embedding".to_string(),
                });
                continue;
            }
        }

        let score = token_overlap_score(&input_tokens, &corpus);
        if score > token_overlap_threshold {
            matches.push(SkillMatch {
                skill: skill.clone(),
                confidence: score,
                matched_trigger: "token_overlap".to_string(),
            });
        }
    }

    matches.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::skill::SkillTrigger;
    use std::path::PathBuf;

    fn skill(id: &str, triggers: Vec<SkillTrigger>) -> Skill {
        Skill {
            id: id.into(),
            name: id.into(),
            description: format!("does {id} stuff"),
            path: PathBuf::from(id),
            triggers,
            instructions: "do the thing".into(),
            enabled: true,
            use_count: 0,
        }
    }

    #[test]
    fn keyword_trigger_fires_on_substring() {
        let s = skill(
            "deploy",
            vec![SkillTrigger {
                kind: TriggerType::Keyword,
                patterns: vec!["deploy".into(), "release".into()],
                confidence: None,
            }],
        );
        let matches = match_input(&[s], "please deploy the service", None, 0.45, 0.15);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].confidence >= 0.5);
    }

    #[test]
    fn always_trigger_scores_low_but_fires() {
        let s = skill(
            "catalog",
            vec![SkillTrigger {
                kind: TriggerType::Always,
                patterns: vec![],
                confidence: None,
            }],
        );
        let matches = match_input(&[s], "anything at all", None, 0.45, 0.15);
        assert_eq!(matches.len(), 1);
        assert!((matches[0].confidence - 0.1).abs() < 1e-6);
    }

    #[test]
    fn disabled_skill_never_matches() {
        let mut s = skill(
            "deploy",
            vec![SkillTrigger {
                kind: TriggerType::Always,
                patterns: vec![],
                confidence: None,
            }],
        );
        s.enabled = false;
        let matches = match_input(&[s], "deploy", None, 0.45, 0.15);
        assert!(matches.is_empty());
    }

    #[test]
    fn token_overlap_fallback_matches_without_triggers() {
        let s = skill("weather", vec![]);
        let matches = match_input(
            &[Skill {
                description: "checks the weather forecast".into(),
                ..s
            }],
            "what is the weather forecast today",
            None,
            0.45,
            0.1,
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_trigger, "token_overlap");
    }

    #[test]
    fn no_fallback_match_below_threshold() {
        let s = skill("weather", vec![]);
        let matches = match_input(
            &[Skill {
                description: "checks the weather forecast".into(),
                ..s
            }],
            "completely unrelated query about rocks",
            None,
            0.45,
            0.15,
        );
        assert!(matches.is_empty());
    }
}
