//! Integration tests for the sponsorship backend.

use std::sync::Arc;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::search::SearchIndex;
use crate::versioning::VersionStore;
use crate::years::AcademicYearAuthority;
use crate::{create_router, AppState};

const API_KEY: &str = "test-api-key";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool.clone()));
        let years = Arc::new(
            AcademicYearAuthority::load(pool.clone())
                .await
                .expect("Failed to load years"),
        );
        let records = Arc::new(VersionStore::new(pool, years.clone()));
        let search = Arc::new(SearchIndex::open(&index_path).expect("Failed to init search"));

        let config = Config {
            api_psk: Some(API_KEY.to_string()),
            db_path,
            index_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
        };

        let state = AppState {
            repo,
            years,
            records,
            search,
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-api-key", API_KEY.parse().unwrap());

        TestFixture {
            client: Client::builder().default_headers(headers).build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request as `actor` (or the service when `None`) and return status and body.
    async fn call(
        &self,
        method: Method,
        path: &str,
        actor: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(actor) = actor {
            request = request.header("x-actor-id", actor);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> Value {
        let (status, body) = self.call(Method::GET, path, None, None).await;
        assert_eq!(status, 200, "GET {} failed: {}", path, body);
        body
    }

    async fn post(&self, path: &str, body: Value) -> Value {
        let (status, body) = self.call(Method::POST, path, None, Some(body)).await;
        assert_eq!(status, 200, "POST {} failed: {}", path, body);
        body
    }

    async fn put(&self, path: &str, body: Value) -> Value {
        let (status, body) = self.call(Method::PUT, path, None, Some(body)).await;
        assert_eq!(status, 200, "PUT {} failed: {}", path, body);
        body
    }

    async fn create_year(&self, name: &str, is_current: bool) -> String {
        let body = self
            .post(
                "/api/academic-years",
                json!({ "yearName": name, "isCurrent": is_current }),
            )
            .await;
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_student(&self, first: &str, last: &str, record: Value) -> String {
        let body = self
            .post(
                "/api/students",
                json!({ "firstName": first, "lastName": last, "record": record }),
            )
            .await;
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_sponsor(&self, first: &str, last: &str) -> Value {
        self.post(
            "/api/sponsors",
            json!({ "firstName": first, "lastName": last, "email": "sponsor@example.org" }),
        )
        .await["data"]
            .clone()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_and_invalid_psk() {
    let fixture = TestFixture::new().await;
    let client = Client::new();

    let resp = client
        .get(fixture.url("/api/revision"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = client
        .get(fixture.url("/api/revision"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_auth_bearer_token() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .header("Authorization", format!("Bearer {}", API_KEY))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_academic_year_switching() {
    let fixture = TestFixture::new().await;

    let body = fixture.get("/api/academic-years/current").await;
    assert!(body["data"].is_null());

    fixture.create_year("2023", true).await;
    let id_2024 = fixture.create_year("2024", false).await;

    let body = fixture.get("/api/academic-years/current").await;
    assert_eq!(body["data"]["yearName"], "2023");

    fixture
        .post(
            &format!("/api/academic-years/{}/set-current", id_2024),
            json!({}),
        )
        .await;

    let body = fixture.get("/api/academic-years/current").await;
    assert_eq!(body["data"]["yearName"], "2024");

    let years = fixture.get("/api/academic-years").await;
    let flagged: Vec<&Value> = years["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|y| y["isCurrent"] == true)
        .collect();
    assert_eq!(flagged.len(), 1);

    let body = fixture
        .get("/api/academic-years/warning?recordYear=2023")
        .await;
    assert!(body["data"]["warning"].is_string());
    let body = fixture
        .get("/api/academic-years/warning?recordYear=2024")
        .await;
    assert!(body["data"]["warning"].is_null());

    let (status, body) = fixture
        .call(
            Method::POST,
            "/api/academic-years/missing/set-current",
            None,
            Some(json!({})),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_past_year_write_keeps_current_view() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2023", true).await;
    let student_id = fixture
        .create_student(
            "Amani",
            "Njeri",
            json!({ "gradeLevel": "Grade 5", "schoolName": "Hillside Primary" }),
        )
        .await;

    let id_2024 = fixture.create_year("2024", false).await;
    fixture
        .post(
            &format!("/api/academic-years/{}/set-current", id_2024),
            json!({}),
        )
        .await;

    // Correct last year's notes while 2024 is current
    let body = fixture
        .put(
            &format!("/api/students/{}/records", student_id),
            json!({ "academicYear": "2023", "values": { "notes": "Transferred mid-year" } }),
        )
        .await;
    assert_eq!(body["data"]["academicYearRecorded"], "2023");
    assert_eq!(body["data"]["isCurrentRecord"], false);
    assert!(body["data"]["crossYearWarning"].is_string());

    let history = fixture
        .get(&format!("/api/students/{}/records", student_id))
        .await;
    let records = history["data"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    let current = &history["data"]["current"];
    assert_eq!(current["academicYearRecorded"], "2024");
    assert_eq!(current["values"]["gradeLevel"], "Grade 5");
    assert!(current["values"]["notes"].is_null());

    let flagged = records
        .iter()
        .filter(|r| r["isCurrentRecord"] == true)
        .count();
    assert_eq!(flagged, 1);

    // Current-year write updates the current row in place
    let body = fixture
        .put(
            &format!("/api/students/{}/records", student_id),
            json!({ "values": { "gradeLevel": "Grade 6" } }),
        )
        .await;
    assert_eq!(body["data"]["academicYearRecorded"], "2024");
    assert_eq!(body["data"]["id"], current["id"]);

    let body = fixture
        .get(&format!("/api/students/{}/records/2023", student_id))
        .await;
    assert_eq!(body["data"]["values"]["gradeLevel"], "Grade 5");
    assert_eq!(body["data"]["values"]["notes"], "Transferred mid-year");

    let body = fixture.get(&format!("/api/students/{}", student_id)).await;
    assert_eq!(body["data"]["currentRecord"]["values"]["gradeLevel"], "Grade 6");
}

#[tokio::test]
async fn test_student_photos_by_year() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2023", true).await;
    let student_id = fixture.create_student("Amani", "Njeri", json!({})).await;
    let id_2024 = fixture.create_year("2024", false).await;
    fixture
        .post(
            &format!("/api/academic-years/{}/set-current", id_2024),
            json!({}),
        )
        .await;
    let path = format!("/api/students/{}/photos", student_id);

    let body = fixture
        .put(
            &path,
            json!({ "values": { "photoUrl": "https://cdn.example.org/2024.jpg", "caption": "Sports day" } }),
        )
        .await;
    assert_eq!(body["data"]["academicYearRecorded"], "2024");
    assert_eq!(body["data"]["isCurrentRecord"], true);
    assert_eq!(body["data"]["values"]["photoUrl"], "https://cdn.example.org/2024.jpg");
    assert_eq!(body["data"]["values"]["caption"], "Sports day");
    assert!(body["data"]["crossYearWarning"].is_null());

    let body = fixture
        .put(
            &path,
            json!({ "academicYear": "2023", "values": { "photoUrl": "https://cdn.example.org/2023.jpg" } }),
        )
        .await;
    assert_eq!(body["data"]["academicYearRecorded"], "2023");
    assert_eq!(body["data"]["isCurrentRecord"], false);
    assert_eq!(body["data"]["values"]["photoUrl"], "https://cdn.example.org/2023.jpg");
    assert!(body["data"]["values"]["caption"].is_null());
    assert!(body["data"]["crossYearWarning"].is_string());

    let history = fixture.get(&path).await;
    let records = history["data"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    let flagged: Vec<&Value> = records
        .iter()
        .filter(|r| r["isCurrentRecord"] == true)
        .collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0]["academicYearRecorded"], "2024");
    assert_eq!(
        history["data"]["current"]["values"]["photoUrl"],
        "https://cdn.example.org/2024.jpg"
    );

    assert_eq!(records[1]["academicYearRecorded"], "2023");
    assert!(records[1]["crossYearWarning"].is_string());
    assert!(records[0]["crossYearWarning"].is_null());
}

#[tokio::test]
async fn test_record_write_rejects_unknown_fields() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2024", true).await;
    let student_id = fixture.create_student("Amani", "Njeri", json!({})).await;

    let (status, body) = fixture
        .call(
            Method::PUT,
            &format!("/api/students/{}/records", student_id),
            None,
            Some(json!({ "values": { "favouriteColour": "blue" } })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture
        .call(
            Method::PUT,
            &format!("/api/students/{}/records", student_id),
            None,
            Some(json!({ "academicYear": "1999", "values": {} })),
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_removing_sponsor_keeps_student() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2024", true).await;
    let student_id = fixture
        .create_student("Amani", "Njeri", json!({ "gradeLevel": "Grade 5" }))
        .await;
    let sponsor = fixture.create_sponsor("Grace", "Hopper").await;
    let sponsor_id = sponsor["id"].as_str().unwrap();

    let body = fixture
        .put(
            &format!("/api/students/{}/sponsor", student_id),
            json!({ "sponsorId": sponsor_id }),
        )
        .await;
    assert_eq!(body["data"]["sponsorId"], sponsor_id);
    assert!(body["data"]["sponsoredSince"].is_string());

    let body = fixture
        .get(&format!("/api/sponsors/{}/students", sponsor_id))
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture
        .call(
            Method::DELETE,
            &format!("/api/sponsors/{}", sponsor_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, 200);

    let body = fixture.get(&format!("/api/students/{}", student_id)).await;
    assert!(body["data"]["sponsorId"].is_null());
    assert!(body["data"]["sponsoredSince"].is_null());
    assert_eq!(body["data"]["currentRecord"]["values"]["gradeLevel"], "Grade 5");
}

#[tokio::test]
async fn test_unassign_sponsor_nulls_link() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2024", true).await;
    let student_id = fixture.create_student("Amani", "Njeri", json!({})).await;
    let sponsor = fixture.create_sponsor("Grace", "Hopper").await;

    fixture
        .put(
            &format!("/api/students/{}/sponsor", student_id),
            json!({ "sponsorId": sponsor["id"], "sponsoredSince": "2024-02-01" }),
        )
        .await;

    let (status, body) = fixture
        .call(
            Method::DELETE,
            &format!("/api/students/{}/sponsor", student_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["data"]["sponsorId"].is_null());

    let (status, body) = fixture
        .call(
            Method::PUT,
            &format!("/api/students/{}/sponsor", student_id),
            None,
            Some(json!({ "sponsorId": "missing" })),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_sponsor_version_mismatch() {
    let fixture = TestFixture::new().await;

    let sponsor = fixture.create_sponsor("Grace", "Hopper").await;
    let id = sponsor["id"].as_str().unwrap();
    let version = sponsor["version"].as_i64().unwrap();

    let body = fixture
        .put(
            &format!("/api/sponsors/{}", id),
            json!({ "phone": "555-0100", "expectedVersion": version }),
        )
        .await;
    assert_eq!(body["data"]["version"], version + 1);

    let (status, body) = fixture
        .call(
            Method::PUT,
            &format!("/api/sponsors/{}", id),
            None,
            Some(json!({ "phone": "555-0199", "expectedVersion": version })),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], version + 1);
}

#[tokio::test]
async fn test_role_policy() {
    let fixture = TestFixture::new().await;

    let viewer = fixture
        .post(
            "/api/profiles",
            json!({ "email": "Viewer@Example.org", "role": "viewer" }),
        )
        .await;
    let viewer_id = viewer["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(viewer["data"]["email"], "viewer@example.org");

    let staff = fixture
        .post(
            "/api/profiles",
            json!({ "email": "staff@example.org", "role": "staff" }),
        )
        .await;
    let staff_id = staff["data"]["id"].as_str().unwrap().to_string();

    // Reads are open to every role
    let (status, _) = fixture
        .call(Method::GET, "/api/sponsors", Some(&viewer_id), None)
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .call(
            Method::POST,
            "/api/sponsors",
            Some(&viewer_id),
            Some(json!({ "firstName": "Ada", "lastName": "Lovelace" })),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    let (status, _) = fixture
        .call(
            Method::POST,
            "/api/sponsors",
            Some(&staff_id),
            Some(json!({ "firstName": "Ada", "lastName": "Lovelace" })),
        )
        .await;
    assert_eq!(status, 200);

    // Year management is admin-only
    let (status, _) = fixture
        .call(
            Method::POST,
            "/api/academic-years",
            Some(&staff_id),
            Some(json!({ "yearName": "2024" })),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .call(Method::GET, "/api/sponsors", Some("no-such-profile"), None)
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn test_exam_scores() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2024", true).await;
    let student_id = fixture.create_student("Amani", "Njeri", json!({})).await;

    let exam = fixture
        .post(
            "/api/exams",
            json!({ "name": "Mathematics", "term": "Term 1", "maxScore": 80, "passingScore": 40 }),
        )
        .await;
    let exam_id = exam["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(exam["data"]["academicYear"], "2024");

    let (status, _) = fixture
        .call(
            Method::POST,
            "/api/exams",
            None,
            Some(json!({ "name": "Broken", "maxScore": 10, "passingScore": 20 })),
        )
        .await;
    assert_eq!(status, 400);

    let score = fixture
        .post(
            &format!("/api/exams/{}/scores", exam_id),
            json!({ "studentId": student_id, "score": 60 }),
        )
        .await;
    assert_eq!(score["data"]["percentage"], 75.0);
    assert_eq!(score["data"]["passed"], true);
    let score_id = score["data"]["scoreId"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .call(
            Method::POST,
            &format!("/api/exams/{}/scores", exam_id),
            None,
            Some(json!({ "studentId": student_id, "score": 10 })),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = fixture
        .call(
            Method::PUT,
            &format!("/api/exam-scores/{}/records", score_id),
            None,
            Some(json!({ "values": { "score": 95 } })),
        )
        .await;
    assert_eq!(status, 400);

    // Role check comes before score bounds
    let viewer = fixture
        .post(
            "/api/profiles",
            json!({ "email": "viewer@example.org", "role": "viewer" }),
        )
        .await;
    let viewer_id = viewer["data"]["id"].as_str().unwrap().to_string();
    let (status, body) = fixture
        .call(
            Method::PUT,
            &format!("/api/exam-scores/{}/records", score_id),
            Some(&viewer_id),
            Some(json!({ "values": { "score": 95 } })),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    fixture
        .put(
            &format!("/api/exam-scores/{}/records", score_id),
            json!({ "values": { "score": 20 } }),
        )
        .await;

    // The exam's bounds cannot drop below a recorded score
    let (status, body) = fixture
        .call(
            Method::PUT,
            &format!("/api/exams/{}", exam_id),
            None,
            Some(json!({ "maxScore": 15, "passingScore": 10 })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let exam = fixture.get(&format!("/api/exams/{}", exam_id)).await;
    assert_eq!(exam["data"]["maxScore"], 80.0);

    let scores = fixture
        .get(&format!("/api/exams/{}/scores", exam_id))
        .await;
    let scores = scores["data"].as_array().unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0]["percentage"], 25.0);
    assert_eq!(scores[0]["passed"], false);

    let dashboard = fixture.get("/api/dashboard").await;
    assert_eq!(dashboard["data"]["examsThisYear"], 1);
    assert_eq!(dashboard["data"]["totalStudents"], 1);
}

#[tokio::test]
async fn test_letters_and_timeline() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2024", true).await;
    let student_id = fixture.create_student("Amani", "Njeri", json!({})).await;
    let sponsor = fixture.create_sponsor("Grace", "Hopper").await;
    fixture
        .put(
            &format!("/api/students/{}/sponsor", student_id),
            json!({ "sponsorId": sponsor["id"] }),
        )
        .await;

    let letter = fixture
        .post(
            &format!("/api/students/{}/letters", student_id),
            json!({ "values": { "title": "Thank you" } }),
        )
        .await;
    assert_eq!(letter["data"]["sponsorId"], sponsor["id"]);
    assert!(letter["data"]["record"]["values"]["sentDate"].is_string());
    let letter_id = letter["data"]["id"].as_str().unwrap().to_string();

    fixture
        .put(
            &format!("/api/letters/{}/records", letter_id),
            json!({ "values": { "body": "Dear Grace" } }),
        )
        .await;
    let history = fixture
        .get(&format!("/api/letters/{}/records", letter_id))
        .await;
    assert_eq!(history["data"]["current"]["values"]["title"], "Thank you");
    assert_eq!(history["data"]["current"]["values"]["body"], "Dear Grace");

    fixture
        .post(
            &format!("/api/students/{}/timeline", student_id),
            json!({ "values": { "eventType": "milestone", "title": "Passed Grade 5" } }),
        )
        .await;
    let timeline = fixture
        .get(&format!("/api/students/{}/timeline", student_id))
        .await;
    let events = timeline["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["record"]["values"]["title"], "Passed Grade 5");
}

#[tokio::test]
async fn test_search_directory() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2024", true).await;
    let student_id = fixture
        .create_student("Amani", "Njeri", json!({ "schoolName": "Hillside Primary" }))
        .await;
    fixture.create_sponsor("Grace", "Hopper").await;

    let body = fixture.get("/api/search?q=hillside").await;
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["kind"], "student");
    assert_eq!(results[0]["id"], student_id.as_str());

    let body = fixture.get("/api/search?q=grace").await;
    assert_eq!(body["data"]["results"][0]["kind"], "sponsor");

    let (status, _) = fixture
        .call(
            Method::DELETE,
            &format!("/api/students/{}", student_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, 200);
    let body = fixture.get("/api/search?q=amani").await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_revision_bumps_on_write() {
    let fixture = TestFixture::new().await;

    let before = fixture.get("/api/revision").await["data"]["revisionId"]
        .as_i64()
        .unwrap();

    let body = fixture.create_sponsor("Grace", "Hopper").await;
    assert!(body["id"].is_string());

    let after = fixture.get("/api/revision").await;
    let after_id = after["data"]["revisionId"].as_i64().unwrap();
    assert!(after_id > before);
    assert_eq!(after["revisionId"], after_id);

    // Failed writes leave the revision alone
    let (status, body) = fixture
        .call(
            Method::POST,
            "/api/sponsors",
            None,
            Some(json!({ "firstName": " ", "lastName": "Hopper" })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["revisionId"], after_id);
}

#[tokio::test]
async fn test_audit_log_records_writes() {
    let fixture = TestFixture::new().await;

    let sponsor = fixture.create_sponsor("Grace", "Hopper").await;

    let body = fixture.get("/api/audit-logs?entity=sponsor").await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "create");
    assert_eq!(entries[0]["actor"], "service");
    assert_eq!(entries[0]["entityId"], sponsor["id"]);
}

#[tokio::test]
async fn test_email_test_requires_settings() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .call(
            Method::POST,
            "/api/settings/email/test",
            None,
            Some(json!({ "to": "office@example.org" })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture
        .call(
            Method::PUT,
            "/api/settings/email",
            None,
            Some(json!({ "value": { "provider": "carrier-pigeon" } })),
        )
        .await;
    assert_eq!(status, 400);

    let body = fixture
        .put(
            "/api/settings/organizationName",
            json!({ "value": "Hillside Sponsorship Trust" }),
        )
        .await;
    assert_eq!(body["data"]["value"], "Hillside Sponsorship Trust");
    let body = fixture.get("/api/settings").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_backup_restore_and_factory_reset() {
    let fixture = TestFixture::new().await;

    fixture.create_year("2024", true).await;
    let student_id = fixture
        .create_student("Amani", "Njeri", json!({ "gradeLevel": "Grade 5" }))
        .await;
    let admin = fixture
        .post(
            "/api/profiles",
            json!({ "email": "admin@example.org", "role": "admin" }),
        )
        .await;
    let admin_id = admin["data"]["id"].as_str().unwrap().to_string();

    let backup = fixture.post("/api/maintenance/backup", json!({})).await;
    let document = backup["data"].clone();
    assert_eq!(document["format"], "sponsorship-backup-v1");
    assert_eq!(document["tables"]["students"].as_array().unwrap().len(), 1);

    let reset = fixture
        .post(
            "/api/maintenance/factory-reset",
            json!({ "preserveUserId": admin_id }),
        )
        .await;
    assert!(reset["data"]["deletedRows"].as_u64().unwrap() > 0);
    let body = fixture.get("/api/students").await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let body = fixture.get("/api/academic-years/current").await;
    assert!(body["data"].is_null());
    let body = fixture.get("/api/profiles").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture
        .call(
            Method::POST,
            "/api/maintenance/factory-reset",
            None,
            Some(json!({ "preserveUserId": "missing" })),
        )
        .await;
    assert_eq!(status, 404);

    fixture.post("/api/maintenance/restore", document).await;
    let body = fixture.get(&format!("/api/students/{}", student_id)).await;
    assert_eq!(body["data"]["currentRecord"]["values"]["gradeLevel"], "Grade 5");
    let body = fixture.get("/api/academic-years/current").await;
    assert_eq!(body["data"]["yearName"], "2024");
    let body = fixture.get("/api/search?q=amani").await;
    assert_eq!(body["data"]["total"], 1);

    let (status, body) = fixture
        .call(
            Method::POST,
            "/api/maintenance/restore",
            None,
            Some(json!({
                "format": "something-else",
                "schemaVersion": 1,
                "exportedAt": "2024-01-01T00:00:00Z",
                "tables": {}
            })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
