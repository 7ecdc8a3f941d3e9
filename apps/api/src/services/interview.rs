//! Interview question generation with the LLM

use serde::Deserialize;
use talentflow_llm_client::{ChatMessage, LlmClient};

use crate::error::{ApiError, ApiResult};
use crate::models::{GeneratedQuestion, InterviewQuestionsRequest};

const SYSTEM_PROMPT: &str = r#"You are an experienced technical recruiter preparing a structured interview.
Write clear, open-ended questions that reveal real experience. Avoid yes/no questions and duplicates.

Respond ONLY with a JSON object of this shape:
{
  "questions": [
    {"question": "<text>", "category": "<technical|behavioral|situational>", "difficulty": "<easy|medium|hard>"}
  ]
}"#;

/// Job description excerpt sent to the model
const MAX_PROMPT_DESCRIPTION_CHARS: usize = 8_000;

#[derive(Debug, Deserialize)]
struct RawQuestions {
    #[serde(default)]
    questions: Vec<GeneratedQuestion>,
}

pub fn build_messages(request: &InterviewQuestionsRequest) -> Vec<ChatMessage> {
    let mut prompt = format!(
        "Write {} interview questions for the role: {}\n",
        request.count,
        request.role.trim()
    );
    if let Some(seniority) = &request.seniority {
        prompt.push_str(&format!("Seniority: {}\n", seniority.trim()));
    }
    if !request.skills.is_empty() {
        prompt.push_str(&format!("Skills to assess: {}\n", request.skills.join(", ")));
    }
    if let Some(description) = request
        .job_description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        let excerpt: String = description.chars().take(MAX_PROMPT_DESCRIPTION_CHARS).collect();
        prompt.push_str(&format!("\nJob description:\n{}\n", excerpt));
    }

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

/// Ask the model for `request.count` questions
///
/// Blank questions are dropped and extras are cut; fewer than requested is
/// accepted, none at all is an error.
pub async fn generate_questions(
    llm: &LlmClient,
    request: &InterviewQuestionsRequest,
) -> ApiResult<Vec<GeneratedQuestion>> {
    let raw: RawQuestions = llm.chat_json(build_messages(request)).await?;

    let questions: Vec<GeneratedQuestion> = raw
        .questions
        .into_iter()
        .filter_map(|mut q| {
            q.question = q.question.trim().to_string();
            (!q.question.is_empty()).then_some(q)
        })
        .take(request.count as usize)
        .collect();

    if questions.is_empty() {
        return Err(ApiError::AiService(
            "model returned no interview questions".to_string(),
        ));
    }

    tracing::debug!(
        role = %request.role,
        requested = request.count,
        generated = questions.len(),
        "Interview questions generated"
    );
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use talentflow_shared_config::LlmConfig;
    use talentflow_test_utils::MockLlmServer;

    fn request(count: u32) -> InterviewQuestionsRequest {
        InterviewQuestionsRequest {
            role: "Site reliability engineer".to_string(),
            seniority: Some("senior".to_string()),
            job_description: Some("Own our Kubernetes platform.".to_string()),
            skills: vec!["Kubernetes".to_string(), "Prometheus".to_string()],
            count,
        }
    }

    fn client(server: &MockLlmServer) -> LlmClient {
        LlmClient::new(&LlmConfig::with_url(server.url()))
            .unwrap()
            .with_retry_config(1, 1)
    }

    #[test]
    fn test_prompt_mentions_inputs() {
        let messages = build_messages(&request(4));
        let prompt = &messages[1].content;
        assert!(prompt.contains("Write 4 interview questions"));
        assert!(prompt.contains("Seniority: senior"));
        assert!(prompt.contains("Kubernetes, Prometheus"));
        assert!(prompt.contains("Own our Kubernetes platform."));
    }

    #[tokio::test]
    async fn test_questions_are_trimmed_and_capped() {
        let server = MockLlmServer::start().await;
        server
            .mock_chat_with_json(json!({"questions": [
                {"question": "  How do you debug a crash-looping pod?  ", "category": "technical"},
                {"question": ""},
                {"question": "Tell us about an outage you led.", "difficulty": "medium"},
                {"question": "How do you size alerts?"}
            ]}))
            .await;

        let questions = generate_questions(&client(&server), &request(2)).await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question, "How do you debug a crash-looping pod?");
        assert_eq!(questions[0].category.as_deref(), Some("technical"));
        assert_eq!(questions[1].difficulty.as_deref(), Some("medium"));
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let server = MockLlmServer::start().await;
        server.mock_chat_with_json(json!({"questions": []})).await;

        assert_matches!(
            generate_questions(&client(&server), &request(3)).await,
            Err(ApiError::AiService(_))
        );
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_ai_error() {
        let server = MockLlmServer::start().await;
        server.mock_chat_failure(400, "bad request").await;

        assert_matches!(
            generate_questions(&client(&server), &request(3)).await,
            Err(ApiError::AiService(_))
        );
    }
}
