//! Router-level tests: the full axum app over an in-memory database, with
//! notifications captured on a channel instead of being sent.

use academy::{
    config::Config,
    notify::{ChannelSink, Dispatcher, Notification},
    server::build_app,
};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "admin@academy.test";
const ADMIN_PASSWORD: &str = "admin-secret";

struct TestApp {
    router: Router,
    notifications: UnboundedReceiver<Notification>,
}

impl TestApp {
    async fn new() -> Self {
        let mut config = Config::in_memory();
        config.workflow.public_url = "https://academy.test".to_string();
        config.auth.admin_email = Some(ADMIN_EMAIL.to_string());
        config.auth.admin_password = Some(ADMIN_PASSWORD.to_string());

        let (sink, notifications) = ChannelSink::new();
        let router = build_app(config, Dispatcher::new(Arc::new(sink)))
            .await
            .expect("app builds");
        Self { router, notifications }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    async fn create_course(&self, admin: &str, title: &str, fee: i64) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/courses",
                Some(admin),
                Some(json!({ "title": title, "fee": fee, "duration": "24 weeks", "level": "Beginner" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["course"]["id"].as_str().unwrap().to_string()
    }

    async fn submit_enquiry(&self, course: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/enquiries",
                None,
                Some(json!({
                    "name": "Asha",
                    "email": "asha@example.com",
                    "phone": "9876543210",
                    "course": course,
                    "message": "Is there a weekend batch?"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["enquiry"]["status"], "new");
        body["enquiry"]["id"].as_str().unwrap().to_string()
    }

    async fn approve(&self, admin: &str, enquiry_id: &str) -> Value {
        let (status, body) = self
            .send(
                Method::PUT,
                &format!("/api/enquiries/{enquiry_id}/status"),
                Some(admin),
                Some(json!({ "status": "approved", "adminNotes": "call back" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    /// Next captured notification matching `pred`, skipping the rest
    async fn next_notification(&mut self, pred: impl Fn(&Notification) -> bool) -> Notification {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let notification = self.notifications.recv().await.expect("sink alive");
                if pred(&notification) {
                    return notification;
                }
            }
        })
        .await
        .expect("notification delivered")
    }

    /// Register and verify a student account, returning its session token
    async fn student_token(&mut self, name: &str, email: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["requiresVerification"], true);

        let code = match self
            .next_notification(|n| matches!(n, Notification::Otp { email: to, .. } if to == email))
            .await
        {
            Notification::Otp { code, .. } => code,
            _ => unreachable!(),
        };

        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/verify-registration",
                None,
                Some(json!({ "email": email, "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_check_responds() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn enquiry_to_enrollment_over_http() {
    let mut app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.create_course(&admin, "Full Stack Development", 50000).await;

    let enquiry_id = app.submit_enquiry("Full Stack Development").await;

    let approved = app.approve(&admin, &enquiry_id).await;
    assert_eq!(approved["enquiry"]["status"], "approved");
    assert_eq!(approved["enquiry"]["adminNotes"], "call back");
    let token = approved["paymentToken"].as_str().unwrap().to_string();
    assert_eq!(
        approved["paymentLink"],
        format!("https://academy.test/payment/{token}")
    );

    let link = app
        .next_notification(|n| matches!(n, Notification::PaymentLink { .. }))
        .await;
    assert_eq!(link.recipient(), "asha@example.com");

    let (status, body) = app
        .send(Method::GET, &format!("/api/enquiries/payment/{token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["enquiry"]["course"]["title"], "Full Stack Development");
    assert_eq!(body["enquiry"]["course"]["fee"], 50000);

    let redemption = json!({
        "paymentToken": token,
        "paymentMethod": "upi",
        "userEmail": "asha@example.com",
        "userName": "Asha"
    });
    let (status, body) = app
        .send(Method::POST, "/api/enrollments/payment-enroll", None, Some(redemption.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["enrollment"]["progress"], 0);
    assert_eq!(body["enrollment"]["paymentMethod"], "upi");
    assert_eq!(body["accountCreated"], true);

    let (status, body) = app
        .send(Method::POST, "/api/enrollments/payment-enroll", None, Some(redemption))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid or expired payment link");

    let (status, _) = app
        .send(Method::GET, &format!("/api/enquiries/payment/{token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .send(Method::GET, &format!("/api/enquiries/{enquiry_id}"), Some(&admin), None)
        .await;
    assert_eq!(body["enquiry"]["status"], "enrolled");

    // The provisioned student can sign in with the mailed password
    let password = match app
        .next_notification(|n| matches!(n, Notification::AccountProvisioned { .. }))
        .await
    {
        Notification::AccountProvisioned { temporary_password, .. } => temporary_password,
        _ => unreachable!(),
    };
    let student = app.login("asha@example.com", &password).await;

    let (status, body) = app
        .send(Method::GET, "/api/enrollments/my-courses", Some(&student), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let enrollments = body["enrollments"].as_array().unwrap();
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0]["course"]["title"], "Full Stack Development");
    assert_eq!(enrollments[0]["enquiryId"], enquiry_id.as_str());
}

#[tokio::test]
async fn admin_cannot_skip_to_enrolled() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.create_course(&admin, "Data Science", 45000).await;
    let enquiry_id = app.submit_enquiry("Data Science").await;

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/api/enquiries/{enquiry_id}/status"),
            Some(&admin),
            Some(json!({ "status": "enrolled" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (_, body) = app
        .send(Method::GET, &format!("/api/enquiries/{enquiry_id}"), Some(&admin), None)
        .await;
    assert_eq!(body["enquiry"]["status"], "new");
}

#[tokio::test]
async fn stale_expected_status_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.create_course(&admin, "Data Science", 45000).await;
    let enquiry_id = app.submit_enquiry("Data Science").await;
    let uri = format!("/api/enquiries/{enquiry_id}/status");

    let (status, _) = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "contacted", "expectedStatus": "new" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "closed", "expectedStatus": "new" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("refresh"));
}

#[tokio::test]
async fn role_checks_use_the_server_side_session() {
    let mut app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/api/enquiries", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = app.send(Method::GET, "/api/enquiries", Some("forged-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let student = app.student_token("Ravi", "ravi@example.com").await;
    for uri in ["/api/enquiries", "/api/reports/dashboard-stats"] {
        let (status, body) = app.send(Method::GET, uri, Some(&student), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body["error"], "Access denied");
    }
    let (status, _) = app
        .send(Method::POST, "/api/courses", Some(&student), Some(json!({ "title": "Hacked", "fee": 1 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(Method::GET, "/api/auth/me", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "user");

    let (status, _) = app.send(Method::POST, "/api/auth/logout", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&student), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn progress_is_validated_and_owned() {
    let mut app = TestApp::new().await;
    let admin = app.admin_token().await;
    let course_id = app.create_course(&admin, "UI/UX Design", 30000).await;
    let student = app.student_token("Meera", "meera@example.com").await;
    let other = app.student_token("Kiran", "kiran@example.com").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/enrollments/enroll",
            Some(&student),
            Some(json!({ "courseId": course_id, "paymentMethod": "card" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["enrollment"]["amountPaid"], 30000);
    let enrollment_id = body["enrollment"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/enrollments/{enrollment_id}/progress");

    let (status, body) = app.send(Method::PUT, &uri, Some(&student), Some(json!({ "progress": 60 }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app.send(Method::PUT, &uri, Some(&student), Some(json!({ "progress": 150 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.send(Method::PUT, &uri, Some(&other), Some(json!({ "progress": 10 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app
        .send(Method::GET, &format!("/api/enrollments/status/{course_id}"), Some(&student), None)
        .await;
    assert_eq!(body["enrolled"], true);
    assert_eq!(body["enrollment"]["progress"], 60);

    let (_, body) = app
        .send(Method::GET, &format!("/api/enrollments/status/{course_id}"), Some(&other), None)
        .await;
    assert_eq!(body["enrolled"], false);
}

#[tokio::test]
async fn concurrent_redemptions_over_http_enroll_once() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.create_course(&admin, "Full Stack Development", 50000).await;
    let enquiry_id = app.submit_enquiry("Full Stack Development").await;
    let token = app.approve(&admin, &enquiry_id).await["paymentToken"]
        .as_str()
        .unwrap()
        .to_string();

    let body = json!({ "paymentToken": token, "paymentMethod": "card", "userEmail": "asha@example.com" });
    let (first, second) = tokio::join!(
        app.send(Method::POST, "/api/enrollments/payment-enroll", None, Some(body.clone())),
        app.send(Method::POST, "/api/enrollments/payment-enroll", None, Some(body.clone())),
    );

    let statuses = [first.0, second.0];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert!(statuses
        .iter()
        .all(|s| matches!(*s, StatusCode::CREATED | StatusCode::NOT_FOUND | StatusCode::CONFLICT)));

    let (_, stats) = app
        .send(Method::GET, "/api/reports/dashboard-stats", Some(&admin), None)
        .await;
    assert_eq!(stats["stats"]["totals"]["enrollments"], 1);
    assert_eq!(stats["stats"]["currentMonth"]["revenue"], 50000);
}

#[tokio::test]
async fn courses_in_use_cannot_be_deleted() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let used = app.create_course(&admin, "Data Science", 45000).await;
    let unused = app.create_course(&admin, "Cloud Basics", 20000).await;
    app.submit_enquiry("Data Science").await;

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/courses/{used}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/courses/{unused}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send(Method::GET, "/api/courses", None, None).await;
    let titles: Vec<&str> = body["courses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Data Science"]);
}

#[tokio::test]
async fn monthly_report_reflects_redemptions() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.create_course(&admin, "Full Stack Development", 50000).await;
    let enquiry_id = app.submit_enquiry("Full Stack Development").await;
    let token = app.approve(&admin, &enquiry_id).await["paymentToken"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, _) = app
        .send(
            Method::POST,
            "/api/enrollments/payment-enroll",
            None,
            Some(json!({ "paymentToken": token, "paymentMethod": "wallet", "userEmail": "asha@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::GET, "/api/reports/monthly-enrollment", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["report"]["summary"]["totalEnrollments"], 1);
    assert_eq!(body["report"]["summary"]["uniqueStudents"], 1);
    assert_eq!(body["report"]["courseStats"][0]["title"], "Full Stack Development");

    let (status, _) = app
        .send(Method::GET, "/api/reports/monthly-enrollment?month=13&year=2025", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
