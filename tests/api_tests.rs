// tests/api_tests.rs

use std::time::Duration;

use exam_platform::{
    config::Config,
    models::test::{NewOption, NewQuestion, NewTest, Test},
    repositories::{MemoryStore, TestRepository},
    routes,
    state::AppState,
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    store: MemoryStore,
    client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    fn token(&self, user_id: i64, role: &str) -> String {
        sign_jwt(user_id, role, SECRET, 600).expect("Failed to sign token")
    }

    async fn post_json(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn post(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// Spawns the app on a random port, backed by an in-memory store.
async fn spawn_app() -> TestApp {
    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        server_addr: ([127, 0, 0, 1], 0).into(),
        db_max_connections: 1,
        db_acquire_timeout: Duration::from_secs(1),
        operation_timeout: Duration::from_secs(5),
    };

    let store = MemoryStore::new();
    let app = routes::create_router(AppState::with_memory(store.clone(), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}

/// Seeds a published test with the given weights; option 1 of every question is correct.
async fn seed_test(app: &TestApp, weights: &[i32], passing_score: i32) -> Test {
    let new_test = NewTest {
        title: "Cell Biology".to_string(),
        description: "Organelles and their functions".to_string(),
        exam_standard: "GCSE".to_string(),
        difficulty: "Medium".to_string(),
        time_limit_minutes: 20,
        passing_score,
        published: true,
        created_by: Some(1),
        questions: weights
            .iter()
            .enumerate()
            .map(|(i, &points)| NewQuestion {
                question_text: format!("Question {}", i + 1),
                image_url: None,
                points,
                options: (0..4)
                    .map(|j| NewOption {
                        option_text: format!("Choice {}", j + 1),
                        is_correct: j == 0,
                    })
                    .collect(),
            })
            .collect(),
    };
    app.store.create_test(new_test).await.unwrap()
}

fn correct_option(test: &Test, index: usize) -> i64 {
    test.questions[index].options[0].id
}

fn wrong_option(test: &Test, index: usize) -> i64 {
    test.questions[index].options[2].id
}

async fn start_attempt(app: &TestApp, token: &str, test_id: i64) -> i64 {
    let response = app.post(&format!("/api/tests/{}/attempts", test_id), token).await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

async fn answer(app: &TestApp, token: &str, attempt_id: i64, question_id: i64, option_id: i64) -> reqwest::Response {
    app.post_json(
        &format!("/api/attempts/{}/answers", attempt_id),
        token,
        json!({ "question_id": question_id, "option_id": option_id }),
    )
    .await
}

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn public_test_hides_correct_answers() {
    let app = spawn_app().await;
    let test = seed_test(&app, &[1, 2], 50).await;

    let list: Value = app
        .client
        .get(app.url("/api/tests"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["title"], "Cell Biology");

    let body: Value = app
        .client
        .get(app.url(&format!("/api/tests/{}", test.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let options = body["questions"][0]["options"].as_array().unwrap();
    assert_eq!(options.len(), 4);
    assert!(options.iter().all(|o| o.get("is_correct").is_none()));
}

#[tokio::test]
async fn student_completes_weighted_test() {
    let app = spawn_app().await;
    let test = seed_test(&app, &[1, 2, 3, 4], 60).await;
    let token = app.token(10, "student");
    let attempt_id = start_attempt(&app, &token, test.id).await;

    let response = answer(&app, &token, attempt_id, test.questions[0].id, correct_option(&test, 0)).await;
    assert_eq!(response.status().as_u16(), 200);
    let feedback: Value = response.json().await.unwrap();
    assert_eq!(feedback["is_correct"], true);

    answer(&app, &token, attempt_id, test.questions[1].id, wrong_option(&test, 1)).await;
    answer(&app, &token, attempt_id, test.questions[2].id, correct_option(&test, 2)).await;

    let progress: Value = app
        .get(&format!("/api/attempts/{}", attempt_id), &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(progress["attempt"]["status"], "in_progress");
    assert_eq!(progress["answers"].as_array().unwrap().len(), 3);

    let response = app
        .post(&format!("/api/attempts/{}/submit", attempt_id), &token)
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 4);
    assert_eq!(result["total_points"], 10);
    assert_eq!(result["percentage"], 40.0);
    assert_eq!(result["passed"], false);
    assert_eq!(result["stats_updated"], true);

    let results: Value = app
        .get(&format!("/api/attempts/{}/results", attempt_id), &token)
        .await
        .json()
        .await
        .unwrap();
    let questions = results["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 4);
    assert_eq!(questions[3]["selected_option_id"], Value::Null);
    assert_eq!(questions[3]["correct_option_id"], correct_option(&test, 3));

    let dashboard: Value = app.get("/api/me/dashboard", &token).await.json().await.unwrap();
    assert_eq!(dashboard["stats"]["total_points"], 4);
    assert_eq!(dashboard["stats"]["tests_completed"], 1);
    assert_eq!(dashboard["stats"]["tests_passed"], 0);
    assert_eq!(dashboard["streak"]["current"], 1);
    assert_eq!(dashboard["average_score"], 40.0);
    assert_eq!(dashboard["recent_attempts"][0]["percentage"], 40.0);
}

#[tokio::test]
async fn reanswering_replaces_the_previous_choice() {
    let app = spawn_app().await;
    let test = seed_test(&app, &[5], 50).await;
    let token = app.token(11, "student");
    let attempt_id = start_attempt(&app, &token, test.id).await;
    let question_id = test.questions[0].id;

    for option in [correct_option(&test, 0), wrong_option(&test, 0), correct_option(&test, 0)] {
        let response = answer(&app, &token, attempt_id, question_id, option).await;
        assert_eq!(response.status().as_u16(), 200);
    }

    let result: Value = app
        .post(&format!("/api/attempts/{}/submit", attempt_id), &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["score"], 5);
    assert_eq!(result["passed"], true);
}

#[tokio::test]
async fn second_submission_conflicts() {
    let app = spawn_app().await;
    let test = seed_test(&app, &[1], 50).await;
    let token = app.token(12, "student");
    let attempt_id = start_attempt(&app, &token, test.id).await;
    let submit = format!("/api/attempts/{}/submit", attempt_id);

    assert_eq!(app.post(&submit, &token).await.status().as_u16(), 200);

    let response = app.post(&submit, &token).await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("completed"));

    let response = answer(&app, &token, attempt_id, test.questions[0].id, correct_option(&test, 0)).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn answers_outside_the_test_are_rejected() {
    let app = spawn_app().await;
    let test = seed_test(&app, &[1, 1], 50).await;
    let other = seed_test(&app, &[1], 50).await;
    let token = app.token(13, "student");
    let attempt_id = start_attempt(&app, &token, test.id).await;

    let response = answer(&app, &token, attempt_id, other.questions[0].id, correct_option(&other, 0)).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = answer(&app, &token, attempt_id, test.questions[0].id, correct_option(&other, 0)).await;
    assert_eq!(response.status().as_u16(), 400);

    // An option of a sibling question is accepted but wrong.
    let response = answer(&app, &token, attempt_id, test.questions[0].id, correct_option(&test, 1)).await;
    assert_eq!(response.status().as_u16(), 200);
    let feedback: Value = response.json().await.unwrap();
    assert_eq!(feedback["is_correct"], false);
}

#[tokio::test]
async fn attempts_are_private_to_their_owner() {
    let app = spawn_app().await;
    let test = seed_test(&app, &[1], 50).await;
    let owner = app.token(14, "student");
    let intruder = app.token(15, "student");
    let teacher = app.token(2, "teacher");
    let attempt_id = start_attempt(&app, &owner, test.id).await;

    let response = answer(&app, &intruder, attempt_id, test.questions[0].id, correct_option(&test, 0)).await;
    assert_eq!(response.status().as_u16(), 403);

    let submit = format!("/api/attempts/{}/submit", attempt_id);
    assert_eq!(app.post(&submit, &intruder).await.status().as_u16(), 403);
    assert_eq!(app.post(&submit, &owner).await.status().as_u16(), 200);

    let results = format!("/api/attempts/{}/results", attempt_id);
    assert_eq!(app.get(&results, &intruder).await.status().as_u16(), 403);
    assert_eq!(app.get(&results, &teacher).await.status().as_u16(), 200);
}

#[tokio::test]
async fn results_are_unavailable_while_in_progress() {
    let app = spawn_app().await;
    let test = seed_test(&app, &[1], 50).await;
    let token = app.token(16, "student");
    let attempt_id = start_attempt(&app, &token, test.id).await;

    let response = app
        .get(&format!("/api/attempts/{}/results", attempt_id), &token)
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn unknown_test_and_attempt_are_not_found() {
    let app = spawn_app().await;
    let token = app.token(17, "student");

    let response = app.post("/api/tests/9999/attempts", &token).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.post("/api/attempts/9999/submit", &token).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let app = spawn_app().await;
    let forged = sign_jwt(1, "student", "wrong_secret", 600).unwrap();

    let response = app.get("/api/me/dashboard", &forged).await;
    assert_eq!(response.status().as_u16(), 401);
}
