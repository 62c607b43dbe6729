/// Result of parsing the raw user input for image triggers and the
/// `/ignore` directive, ahead of dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    pub skip_ai: bool,
    pub image_prompt: Option<String>,
    pub processed_text: String,
}

/// Parses `input` against `image_triggers` and the `/ignore` directive.
///
/// Precedence: an image trigger match wins outright (the `/ignore` pass never
/// runs). Otherwise every line is checked for `/ignore`; text from the
/// directive to end-of-line is stripped, and the whole line is dropped if
/// nothing survives before it. If the final trimmed residual is empty, the
/// call is marked `skip_ai`.
pub fn parse_command(input: &str, image_triggers: &[String]) -> CommandOutcome {
    if let Some(prompt) = match_image_trigger(input, image_triggers) {
        if !prompt.is_empty() {
            return CommandOutcome {
                skip_ai: true,
                image_prompt: Some(prompt),
                processed_text: String::new(),
            };
        }
    }

    let stripped = strip_ignore_lines(input);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return CommandOutcome {
            skip_ai: true,
            image_prompt: None,
            processed_text: String::new(),
        };
    }

    CommandOutcome {
        skip_ai: false,
        image_prompt: None,
        processed_text: stripped,
    }
}

fn match_image_trigger(input: &str, triggers: &[String]) -> Option<String> {
    let lower = input.to_lowercase();
    triggers
        .iter()
        .filter(|t| !t.is_empty())
        .filter_map(|trigger| {
            let trigger_lower = trigger.to_lowercase();
            lower.find(&trigger_lower).map(|pos| (pos, trigger.len()))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(pos, len)| input[pos + len..].trim().to_string())
}

fn strip_ignore_lines(input: &str) -> String {
    const DIRECTIVE: &str = "/ignore";
    let mut out_lines = Vec::new();
    for line in input.lines() {
        let lower = line.to_lowercase();
        if let Some(pos) = lower.find(DIRECTIVE) {
            let before = &line[..pos];
            if before.trim().is_empty() {
                continue;
            }
            out_lines.push(before.trim_end().to_string());
        } else {
            out_lines.push(line.to_string());
        }
    }
    out_lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers() -> Vec<String> {
        vec!["@image".to_string(), "/image".to_string()]
    }

    #[test]
    fn image_trigger_sets_skip_ai_and_prompt() {
        let out = parse_command("/image a sunset", &triggers());
        assert_eq!(
            out,
            CommandOutcome {
                skip_ai: true,
                image_prompt: Some("a sunset".to_string()),
                processed_text: String::new(),
            }
        );
    }

    #[test]
    fn image_trigger_is_case_insensitive_and_first_match_wins() {
        let out = parse_command("please @IMAGE a cat, then /image a dog", &triggers());
        assert_eq!(out.image_prompt.as_deref(), Some("a cat, then /image a dog"));
    }

    #[test]
    fn empty_prompt_after_trigger_falls_through_to_ignore_handling() {
        let out = parse_command("/image", &triggers());
        assert_eq!(out.image_prompt, None);
        assert!(!out.skip_ai);
        assert_eq!(out.processed_text, "/image");
    }

    #[test]
    fn ignore_directive_strips_to_end_of_line() {
        let out = parse_command("Hello\n/ignore secret\nWorld", &triggers());
        assert_eq!(out.processed_text, "Hello\nWorld");
        assert!(!out.skip_ai);
    }

    #[test]
    fn ignore_directive_drops_whole_line_when_nothing_precedes_it() {
        let out = parse_command("keep this\n/ignore entire line\nand this", &triggers());
        assert_eq!(out.processed_text, "keep this\nand this");
    }

    #[test]
    fn multiple_ignore_directives_in_one_input_all_apply() {
        let out = parse_command("a /ignore x\nb /ignore y\nc", &triggers());
        assert_eq!(out.processed_text, "a\nb\nc");
    }

    #[test]
    fn fully_ignored_input_sets_skip_ai() {
        let out = parse_command("/ignore only this", &triggers());
        assert!(out.skip_ai);
        assert_eq!(out.processed_text, "");
    }

    #[test]
    fn image_trigger_takes_priority_over_ignore() {
        let out = parse_command("/image a cat /ignore tail", &triggers());
        assert_eq!(out.image_prompt.as_deref(), Some("a cat /ignore tail"));
    }
}
