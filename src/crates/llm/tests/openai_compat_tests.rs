//! OpenAI-compatible client against a scripted in-process HTTP endpoint.

use llm::remote::{GroqClient, OpenAiClient};
use llm::{RemoteLlmConfig, RetryPolicy};
use parking_lot::Mutex;
use parley_core::{ChatModel, ChatRequest, Message, ModelError, ToolDefinition};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone, Default)]
struct Endpoint {
    replies: Arc<Mutex<VecDeque<(u16, Value)>>>,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Endpoint {
    fn push(&self, status: u16, body: Value) -> &Self {
        self.replies.lock().push_back((status, body));
        self
    }

    fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }
}

async fn handle(mut stream: TcpStream, endpoint: Endpoint) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let header = |name: &str| {
        head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };
    let length: usize = header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body: Value = serde_json::from_slice(&buf[header_end..header_end + length]).unwrap();
    let auth = header("authorization").unwrap_or_default();
    endpoint.requests.lock().push((auth, body));

    let (status, reply) = endpoint
        .replies
        .lock()
        .pop_front()
        .unwrap_or((500, json!({"error": "script exhausted"})));
    let reply = reply.to_string();
    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reply.len(),
        reply
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.ok();
}

async fn spawn_endpoint() -> (String, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
    let endpoint = Endpoint::default();

    let served = endpoint.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle(stream, served.clone()));
        }
    });

    (base_url, endpoint)
}

fn completion(message: Value) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "llama-3.1-8b-instant",
        "choices": [{"index": 0, "message": message, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 30, "completion_tokens": 5, "total_tokens": 35}
    })
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries)
        .with_initial_interval(0.01)
        .with_jitter(false)
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    let (base_url, endpoint) = spawn_endpoint().await;
    endpoint.push(
        200,
        completion(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "search_abstracts", "arguments": "{\"term\":\"asthma\"}"}
            }]
        })),
    );

    let client = GroqClient::new(RemoteLlmConfig::new(
        "gsk_testkey",
        base_url,
        "llama-3.1-8b-instant",
    ))
    .unwrap();

    let tool = ToolDefinition::new("search_abstracts", "Search PubMed abstracts").with_parameters(
        json!({"type": "object", "properties": {"term": {"type": "string"}}, "required": ["term"]}),
    );
    let request = ChatRequest::new(vec![
        Message::system("You are a medical librarian."),
        Message::user("Find asthma papers"),
    ])
    .with_tools(vec![tool])
    .with_temperature(0.7);

    let response = client.chat(request).await.unwrap();
    assert_eq!(response.message.tool_calls.len(), 1);
    assert_eq!(response.message.tool_calls[0].id, "call_1");
    assert_eq!(response.message.tool_calls[0].arguments["term"], "asthma");
    assert_eq!(response.usage.unwrap().input_tokens, 30);

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    let (auth, body) = &requests[0];
    assert_eq!(auth, "Bearer gsk_testkey");
    assert_eq!(body["model"], "llama-3.1-8b-instant");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["tools"][0]["function"]["name"], "search_abstracts");
    assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_missing_model_is_unavailable() {
    let (base_url, endpoint) = spawn_endpoint().await;
    endpoint.push(
        404,
        json!({"error": {"message": "The model `llama-9` does not exist", "code": "model_not_found"}}),
    );

    let client = OpenAiClient::new(RemoteLlmConfig::new("sk-testkey-123456", base_url, "llama-9"))
        .unwrap()
        .with_retry_policy(fast_retries(2));

    let err = client
        .chat(ChatRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.is_unavailable(), "got {:?}", err);
    // 404 is permanent
    assert_eq!(endpoint.requests().len(), 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let (base_url, endpoint) = spawn_endpoint().await;
    endpoint
        .push(503, json!({"error": "overloaded"}))
        .push(200, completion(json!({"role": "assistant", "content": "Asthma is a chronic airway disease."})));

    let client = OpenAiClient::new(RemoteLlmConfig::new("sk-testkey-123456", base_url, "m"))
        .unwrap()
        .with_retry_policy(fast_retries(2));

    let response = client
        .chat(ChatRequest::new(vec![Message::user("What is asthma?")]))
        .await
        .unwrap();
    assert_eq!(response.message.content, "Asthma is a chronic airway disease.");
    assert!(response.message.tool_calls.is_empty());
    assert_eq!(endpoint.requests().len(), 2);
}

#[tokio::test]
async fn test_auth_failure_is_generic_and_redacted() {
    let (base_url, endpoint) = spawn_endpoint().await;
    endpoint.push(
        401,
        json!({"error": {"message": "Incorrect API key provided: sk-badkey-abcdef123"}}),
    );

    let client = OpenAiClient::new(RemoteLlmConfig::new("sk-badkey-abcdef123", base_url, "m"))
        .unwrap()
        .with_retry_policy(fast_retries(2));

    let err = client
        .chat(ChatRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    match err {
        ModelError::Failure(message) => assert!(!message.contains("sk-badkey-abcdef123")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
    drop(listener);

    let client = OpenAiClient::new(RemoteLlmConfig::new("sk-testkey-123456", base_url, "m"))
        .unwrap()
        .with_retry_policy(fast_retries(1));

    let err = client
        .chat(ChatRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.is_unavailable(), "got {:?}", err);
}
