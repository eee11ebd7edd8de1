use crate::model::{Model, ModelKind, ModelParameters};
use crate::request::InputData;
use crate::result::{AiError, PredictionValue};
use crate::strategy::{Inference, InferenceStrategy};

use super::{argmax, blend, mismatch, softmax};

/// Bag-of-words lexicon scorer over a free-text feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct NlpStrategy;

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl InferenceStrategy for NlpStrategy {
    fn kind(&self) -> ModelKind {
        ModelKind::Nlp
    }

    fn infer(&self, model: &Model, input: &InputData) -> Result<Inference, AiError> {
        let ModelParameters::Nlp {
            labels,
            lexicon,
            text_field,
        } = &model.parameters
        else {
            return Err(mismatch(ModelKind::Nlp));
        };

        let text = input
            .get(text_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| AiError::invalid_input(format!("missing text feature '{text_field}'")))?;

        let mut logits = vec![0.0; labels.len()];
        let (mut tokens, mut matched) = (0usize, 0usize);
        for token in tokenize(text) {
            tokens += 1;
            if let Some(weights) = lexicon.get(&token) {
                matched += 1;
                for (logit, w) in logits.iter_mut().zip(weights) {
                    *logit += w;
                }
            }
        }

        let probabilities = softmax(&logits);
        let best = argmax(&probabilities);
        let coverage = if tokens == 0 {
            0.0
        } else {
            matched as f64 / tokens as f64
        };

        Ok(Inference::new(
            PredictionValue::Label(labels[best].clone()),
            blend(model.accuracy, probabilities[best]) * (0.5 + 0.5 * coverage),
            probabilities,
        ))
    }
}
