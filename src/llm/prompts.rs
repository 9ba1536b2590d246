//! Prompts used for answer generation and answer judging.

/// Collection of prompts used by the toolkit.
pub struct Prompts;

impl Prompts {
    /// Header of the batched judge prompt. Followed by one block per item
    /// (see [`Prompts::judge_batch_item`]) and [`Prompts::judge_batch_footer`].
    pub fn judge_batch_header() -> &'static str {
        r#"You are a question-answering judge. You will be given several QA pairs.
Each pair has an id, a question, a reference answer and a model answer.
Decide for every pair whether the model answer is correct with respect to the reference answer.
Return the result as a JSON object whose keys are the ids and whose values are 1 (correct) or 0 (incorrect).
Do not add any explanation. Return only strictly valid JSON.
"#
    }

    /// One item block of the batched judge prompt.
    pub fn judge_batch_item() -> &'static str {
        r#"Id: {id}
Question: {question}
Reference answer: {reference}
Model answer: {candidate}
"#
    }

    /// Closing instruction of the batched judge prompt, with an example.
    pub fn judge_batch_footer() -> &'static str {
        r#"Return JSON in exactly this format, for example: {"1":1,"2":0}"#
    }

    /// Prompt to judge a single answer with a bare `1`/`0`.
    pub fn judge_single() -> &'static str {
        r#"You are a question-answering judge. Decide whether the "model answer" below is correct.
Reply with only "1" if it is correct or "0" if it is incorrect, with no other explanation.

Question: {question}
Reference answer: {reference}
Model answer: {candidate}

Is the model answer correct (1 for correct, 0 for incorrect)?"#
    }

    /// Opening line of a converted dialogue prompt.
    pub fn dialogue_header() -> &'static str {
        "The following is the dialogue between the two people: {speaker_a} and {speaker_b} The dialogue lasted for several days, and the date of each dialogue was written at the beginning of the dialogue.\n"
    }

    /// Instructions placed between the dialogue and the numbered questions.
    pub fn answer_instructions() -> &'static [&'static str] {
        &[
            "According to the above dialogue, write down the simplest answer with the least number of words to each of the following questions in a few sentences.",
            r#"Write the answer in the form of a json, where each entry contains the question number as "key" and the short answer as "value". ex: {"0":"xx","1":"xx"}"#,
            "Try to answer with the exact words in the dialogue.",
        ]
    }
}

/// Fill `{name}` placeholders in a prompt template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}
