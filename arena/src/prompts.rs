//! Prompt text sent to competitors.
//!
//! Both prompts pin the `[Start of code]` / `[End of code]` delimiters and the
//! `# Visible test cases` / `# Hidden test cases` markers that
//! [`crate::challenge`] parses.

use crate::challenge::{CODE_END, CODE_START};

/// First line of the challenge prompt; used by fakes to tell the two prompts apart.
pub const CHALLENGE_HEADER: &str = "**Your Task:**";

/// Fixed challenge-creation prompt, identical for every competitor and round.
pub fn challenge_prompt() -> String {
    format!(
        r#"{CHALLENGE_HEADER}
Design a function X of ANY type and write unit tests for it. You will play several rounds with alternating roles, and your memory is reset before every round. Your goal is a function your opponent fails to implement correctly while you can still implement it yourself later, from the visible tests alone.

**Key Points:**
- X can be mathematical, string processing, list manipulation, data transformation, an algorithm, or draw on any public field of knowledge.
- Make it hard enough to trip up your opponent but not so obscure that you fail yourself.

**Instructions:**
1. Explain how X works before writing any tests.
2. Write enough visible tests for X to be inferable from them alone.
3. Add hidden tests that check an implementation is genuinely correct.
4. Do not leak hints through names or trailing comments in the tests.
5. Only the visible tests are shown when answering, to you and to your opponent.
6. The function **must** be called "X".

**Expected (exact) format:**
{CODE_START}
def test_X():
    # Visible test cases
    assert X(input) == expected_output
    assert X(input) == expected_output

    # Hidden test cases
    assert X(input) == expected_output
    assert X(input) == expected_output
{CODE_END}"#
    )
}

/// Implementation prompt containing only the visible tests.
pub fn implementation_prompt(visible_tests: &str) -> String {
    format!(
        r#"Based on the following test cases, work out what the function X does and implement it.

Test cases:
{visible_tests}

Your task:
1. Analyse the test cases carefully.
2. Implement function X so that it passes them.
3. Hidden test cases will also be run against your implementation.
4. Reply with only the definition of X, wrapped in the code tags shown below.

{CODE_START}
# Your implementation of function X goes here
{CODE_END}
"#
    )
}

/// Whether `prompt` is the challenge-creation prompt (as opposed to an attempt).
pub fn is_challenge_prompt(prompt: &str) -> bool {
    prompt.starts_with(CHALLENGE_HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{parse_attempt, parse_challenge, Candidate};

    #[test]
    fn implementation_prompt_contains_only_given_tests() {
        let prompt = implementation_prompt("assert X(2) == 4");
        assert!(prompt.contains("assert X(2) == 4"));
        assert!(!is_challenge_prompt(&prompt));
    }

    #[test]
    fn challenge_prompt_is_recognised() {
        assert!(is_challenge_prompt(&challenge_prompt()));
    }

    #[test]
    fn instructions_never_name_both_tags_inline() {
        for prompt in [challenge_prompt(), implementation_prompt("assert X(1) == 1")] {
            for line in prompt.lines() {
                assert!(
                    !(line.contains(CODE_START) && line.contains(CODE_END)),
                    "{line}"
                );
            }
        }
    }

    #[test]
    fn echoed_template_parses_to_placeholders() {
        // A model that parrots the template back produces predicates that can
        // never pass, not a parse error.
        let challenge = parse_challenge(&challenge_prompt());
        assert_eq!(challenge.visible.len(), 2);
        assert_eq!(challenge.hidden.len(), 2);

        let parrot = parse_attempt(&implementation_prompt("assert X(1) == 1"));
        assert_eq!(
            parrot,
            Candidate::Code("# Your implementation of function X goes here".into())
        );
    }
}
