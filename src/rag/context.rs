use crate::config::ContextConfig;
use crate::model::FusedResult;

/// Joins fused passages, best first, into the grounding text for the answer
/// prompt.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    separator: String,
    excerpt_index: bool,
    max_chars: Option<usize>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(&ContextConfig::default())
    }
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            separator: config.separator.clone(),
            excerpt_index: config.excerpt_index,
            max_chars: config.max_chars,
        }
    }

    pub fn assemble(&self, fused: &[FusedResult]) -> String {
        let mut context = String::new();
        let mut used_chars = 0usize;

        for (index, result) in fused.iter().enumerate() {
            let mut block = String::new();
            if self.excerpt_index {
                block.push_str(&format!("[{}] ", index + 1));
            }
            block.push_str(&result.document.content);
            block.push_str(&self.separator);

            let block_chars = block.chars().count();
            match self.max_chars {
                Some(limit) if used_chars + block_chars > limit => {
                    let remaining = limit - used_chars;
                    context.extend(block.chars().take(remaining));
                    break;
                }
                _ => {
                    context.push_str(&block);
                    used_chars += block_chars;
                }
            }
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;

    fn fused(contents: &[&str]) -> Vec<FusedResult> {
        contents
            .iter()
            .enumerate()
            .map(|(index, content)| FusedResult {
                document: Document::new(*content),
                rrf_score: 1.0 / (index as f64 + 2.0),
            })
            .collect()
    }

    #[test]
    fn default_assembly_appends_newline_after_each_passage() {
        let context = ContextAssembler::default().assemble(&fused(&["Primeiro.", "Segundo."]));
        assert_eq!(context, "Primeiro.\nSegundo.\n");
    }

    #[test]
    fn empty_fusion_gives_empty_context() {
        assert_eq!(ContextAssembler::default().assemble(&[]), "");
    }

    #[test]
    fn excerpt_index_and_custom_separator() {
        let assembler = ContextAssembler::new(&ContextConfig {
            separator: "\n\n".to_string(),
            excerpt_index: true,
            max_chars: None,
        });
        let context = assembler.assemble(&fused(&["A", "B"]));
        assert_eq!(context, "[1] A\n\n[2] B\n\n");
    }

    #[test]
    fn max_chars_cuts_on_char_boundary() {
        let assembler = ContextAssembler::new(&ContextConfig {
            separator: "\n".to_string(),
            excerpt_index: false,
            max_chars: Some(8),
        });
        let context = assembler.assemble(&fused(&["ação", "edição", "outro"]));
        assert_eq!(context, "ação\nedi");
        assert_eq!(context.chars().count(), 8);
    }

    #[test]
    fn max_chars_larger_than_context_changes_nothing() {
        let assembler = ContextAssembler::new(&ContextConfig {
            max_chars: Some(1_000),
            ..ContextConfig::default()
        });
        assert_eq!(assembler.assemble(&fused(&["x", "y"])), "x\ny\n");
    }
}
