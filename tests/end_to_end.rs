use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use sql_agent::llm::{FinishReason, LLMClient, LLMError, LLMInput, LLMOutput, Usage};
use sql_agent::store::{load_csv, CsvSource, SqliteStore};
use sql_agent::{Agent, AgentConfig, AgentError, Part, RetryPolicy, Role, ToolRegistry};

/// A model stand-in that answers from whatever the last tool turn returned.
struct ToolEchoModel {
    first_call: Part,
    answer: fn(&Value) -> String,
    calls: AtomicUsize,
}

#[async_trait]
impl LLMClient for ToolEchoModel {
    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = input.turns.last().ok_or_else(|| LLMError::InvalidResponse("empty".into()))?;

        let parts = match last.role {
            Role::User => vec![self.first_call.clone()],
            Role::Tool => match &last.parts[0] {
                Part::FunctionResponse { response, .. } => vec![Part::text((self.answer)(response))],
                other => return Err(LLMError::InvalidResponse(format!("unexpected {other:?}"))),
            },
            Role::Model => return Err(LLMError::InvalidResponse("model turn last".into())),
        };

        Ok(LLMOutput {
            parts,
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        })
    }
}

/// Writes a customers CSV with `married` of `total` rows married and loads it.
async fn customers_db(total: usize, married: usize) -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from(
        "first_name,last_name,email,phone,address,gender,age,registered,orders,spent,job,hobbies,is_married\n",
    );
    for i in 0..total {
        csv.push_str(&format!(
            "Name{i},Last{i},user{i}@example.com,555-{i:04},\"{i} Main St, Springfield\",Female,{age},2020-01-01,{orders},{spent:.2},Engineer,Reading,{married}\n",
            age = 20 + i % 50,
            orders = i % 7,
            spent = i as f64 * 10.5,
            married = if i < married { "True" } else { "False" },
        ));
    }
    let csv_path = dir.path().join("customers.csv");
    std::fs::write(&csv_path, csv).unwrap();

    let store = SqliteStore::create(dir.path().join("customers.db"));
    let report = assert_ok!(load_csv(&CsvSource::Path(csv_path), &store).await);
    assert_eq!(report.rows_inserted, total);
    (dir, store)
}

fn agent(model: Arc<ToolEchoModel>, store: SqliteStore) -> Agent {
    let config = AgentConfig {
        retry: RetryPolicy::none(),
        ..AgentConfig::default()
    };
    Agent::new(model, ToolRegistry::new(Arc::new(store)), config)
}

#[tokio::test]
async fn test_list_the_tables() {
    let (_dir, store) = customers_db(3, 1).await;
    let model = Arc::new(ToolEchoModel {
        first_call: Part::function_call("list_tables", json!({})),
        answer: |response| {
            let tables: Vec<&str> = response["data"]["tables"]
                .as_array()
                .map(|t| t.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            format!("The database contains: {}", tables.join(", "))
        },
        calls: AtomicUsize::new(0),
    });

    let conversation = assert_ok!(agent(model.clone(), store).run("List the tables").await);

    let roles: Vec<Role> = conversation.turns().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool, Role::Model]);
    assert_eq!(
        sql_agent::agent::final_answer(&conversation),
        "The database contains: customers"
    );
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_count_married_customers() {
    let (_dir, store) = customers_db(100, 42).await;
    let model = Arc::new(ToolEchoModel {
        first_call: Part::function_call(
            "run_query",
            json!({"query": "SELECT COUNT(*) AS married FROM customers WHERE is_married = 1"}),
        ),
        answer: |response| match response["data"][0]["married"].as_i64() {
            Some(n) => format!("There are {n} married customers."),
            None => format!("Unexpected result: {response}"),
        },
        calls: AtomicUsize::new(0),
    });

    let answer = assert_ok!(agent(model, store).invoke("How many customers are married?").await);
    assert_eq!(answer, "There are 42 married customers.");
}

#[tokio::test]
async fn test_bad_sql_is_reported_to_the_model() {
    let (_dir, store) = customers_db(2, 0).await;
    let model = Arc::new(ToolEchoModel {
        first_call: Part::function_call("run_query", json!({"query": "SELECT * FROM orders"})),
        answer: |response| response["data"]["error"].as_str().unwrap_or("none").to_string(),
        calls: AtomicUsize::new(0),
    });

    let answer = assert_ok!(agent(model, store).invoke("Show me the orders").await);
    assert!(answer.starts_with("Error: "), "got {answer}");
    assert!(answer.contains("no such table"), "got {answer}");
}

#[tokio::test]
async fn test_model_that_never_answers_hits_step_cap() {
    let (_dir, store) = customers_db(1, 0).await;
    let model = Arc::new(ToolEchoModel {
        first_call: Part::function_call("list_tables", json!({})),
        answer: |_| String::new(),
        calls: AtomicUsize::new(0),
    });
    let agent = Agent::new(
        model,
        ToolRegistry::new(Arc::new(store)),
        AgentConfig {
            max_steps: Some(1),
            retry: RetryPolicy::none(),
            ..AgentConfig::default()
        },
    );

    let err = assert_err!(agent.invoke("loop").await);
    assert!(matches!(err, AgentError::MaxStepsExceeded(1)));
}
