//! Scenario flows driven against a mockito stand-in for the PVZ service.
//!
//! Each mock is created with an exact `expect(n)` so the tests also prove how
//! many objects an iteration creates in the target system.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use std::time::Duration;

use pvz_loadtest::loadtest::checks;
use pvz_loadtest::loadtest::client::{Endpoint, PvzClient};
use pvz_loadtest::loadtest::config::Flow;
use pvz_loadtest::loadtest::scenario::ScenarioRunner;

const MODERATOR_TOKEN: &str = "moderator-token";
const EMPLOYEE_TOKEN: &str = "employee-token";
const PVZ_ID: &str = "7d1a3b2e-0000-4000-8000-000000000001";

fn runner(server: &ServerGuard, flow: Flow) -> ScenarioRunner {
    let client = PvzClient::new(reqwest::Client::new(), server.url(), Duration::from_secs(5));
    ScenarioRunner::new(client, flow, "Moscow", "box")
}

async fn mock_login(server: &mut ServerGuard, role: &str, token: &str) -> Mock {
    server
        .mock("POST", "/dummyLogin")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({ "role": role })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "token": token }).to_string())
        .expect(1)
        .create_async()
        .await
}

async fn mock_create_pvz(server: &mut ServerGuard, response_city: &str) -> Mock {
    server
        .mock("POST", "/pvz")
        .match_header("authorization", format!("Bearer {MODERATOR_TOKEN}").as_str())
        .match_body(Matcher::Json(json!({ "city": "Moscow" })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": PVZ_ID,
                "registrationDate": "2026-10-17T10:00:00Z",
                "city": response_city,
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await
}

async fn mock_add_product(server: &mut ServerGuard, token: &str) -> Mock {
    server
        .mock("POST", "/products")
        .match_header("authorization", format!("Bearer {token}").as_str())
        .match_body(Matcher::Json(json!({ "pvzId": PVZ_ID, "type": "box" })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "id": "product-1", "type": "box" }).to_string())
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn moderator_product_yields_three_passing_checks() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, "moderator", MODERATOR_TOKEN).await;
    let pvz = mock_create_pvz(&mut server, "Moscow").await;
    let product = mock_add_product(&mut server, MODERATOR_TOKEN).await;

    let it = runner(&server, Flow::ModeratorProduct).run_iteration().await;

    let names: Vec<&str> = it.checks.iter().map(|c| c.name).collect();
    assert_eq!(
        names,
        [checks::DUMMY_LOGIN, checks::CREATE_PVZ, checks::ADD_PRODUCT]
    );
    assert!(it.all_passed(), "checks: {:?}", it.checks);
    assert_eq!(it.session.token.as_deref(), Some(MODERATOR_TOKEN));
    assert_eq!(it.session.pvz_id.as_deref(), Some(PVZ_ID));
    assert!(it.samples.iter().all(|s| s.result.is_ok()));

    // Exactly one pickup point and one product created.
    login.assert_async().await;
    pvz.assert_async().await;
    product.assert_async().await;
}

#[tokio::test]
async fn dual_role_logs_in_employee_without_using_the_token() {
    let mut server = Server::new_async().await;
    let moderator = mock_login(&mut server, "moderator", MODERATOR_TOKEN).await;
    let employee = mock_login(&mut server, "employee", EMPLOYEE_TOKEN).await;
    let pvz = mock_create_pvz(&mut server, "Moscow").await;
    let product = server
        .mock("POST", "/products")
        .expect(0)
        .create_async()
        .await;

    let it = runner(&server, Flow::DualRole).run_iteration().await;

    let names: Vec<&str> = it.checks.iter().map(|c| c.name).collect();
    assert_eq!(
        names,
        [
            checks::DUMMY_LOGIN,
            checks::CREATE_PVZ,
            checks::DUMMY_LOGIN_EMPLOYEE
        ]
    );
    assert!(it.all_passed(), "checks: {:?}", it.checks);
    assert_eq!(it.session.token.as_deref(), Some(MODERATOR_TOKEN));
    assert_eq!(it.session.employee_token.as_deref(), Some(EMPLOYEE_TOKEN));

    moderator.assert_async().await;
    employee.assert_async().await;
    pvz.assert_async().await;
    product.assert_async().await;
}

#[tokio::test]
async fn city_mismatch_fails_only_the_create_pvz_check() {
    let mut server = Server::new_async().await;
    let _login = mock_login(&mut server, "moderator", MODERATOR_TOKEN).await;
    let _pvz = mock_create_pvz(&mut server, "Kazan").await;
    let _product = mock_add_product(&mut server, MODERATOR_TOKEN).await;

    let it = runner(&server, Flow::ModeratorProduct).run_iteration().await;

    let results: Vec<(&str, bool)> = it.checks.iter().map(|c| (c.name, c.passed)).collect();
    assert_eq!(
        results,
        [
            (checks::DUMMY_LOGIN, true),
            (checks::CREATE_PVZ, false),
            (checks::ADD_PRODUCT, true),
        ]
    );
    // A check failure is not a request failure.
    assert!(it.samples.iter().all(|s| s.result.is_ok()));
}

#[tokio::test]
async fn failed_login_cascades_without_authorization_header() {
    let mut server = Server::new_async().await;
    let _login = server
        .mock("POST", "/dummyLogin")
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;
    let pvz = server
        .mock("POST", "/pvz")
        .match_header("authorization", Matcher::Missing)
        .with_status(401)
        .with_body(json!({ "message": "unauthorized" }).to_string())
        .expect(1)
        .create_async()
        .await;
    let product = server
        .mock("POST", "/products")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({ "type": "box" })))
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let it = runner(&server, Flow::ModeratorProduct).run_iteration().await;

    assert_eq!(it.checks.len(), 3);
    assert!(it.checks.iter().all(|c| !c.passed));
    assert_eq!(it.session.token, None);
    assert_eq!(it.session.pvz_id, None);
    assert_eq!(
        it.samples[0].result.as_ref().unwrap_err().error_category(),
        "http"
    );

    pvz.assert_async().await;
    product.assert_async().await;
}

#[tokio::test]
async fn reception_cycle_runs_full_lifecycle_as_employee() {
    let mut server = Server::new_async().await;
    let employee_auth = format!("Bearer {EMPLOYEE_TOKEN}");

    let _moderator = mock_login(&mut server, "moderator", MODERATOR_TOKEN).await;
    let _employee = mock_login(&mut server, "employee", EMPLOYEE_TOKEN).await;
    let _pvz = mock_create_pvz(&mut server, "Moscow").await;
    let reception = server
        .mock("POST", "/receptions")
        .match_header("authorization", employee_auth.as_str())
        .match_body(Matcher::Json(json!({ "pvzId": PVZ_ID })))
        .with_status(200)
        .with_body(json!({ "id": "r-1", "pvzId": PVZ_ID, "status": "in_progress" }).to_string())
        .expect(1)
        .create_async()
        .await;
    let product = mock_add_product(&mut server, EMPLOYEE_TOKEN).await;
    let delete = server
        .mock("POST", format!("/pvz/{PVZ_ID}/delete_last_product").as_str())
        .match_header("authorization", employee_auth.as_str())
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let close = server
        .mock("POST", format!("/pvz/{PVZ_ID}/close_last_reception").as_str())
        .match_header("authorization", employee_auth.as_str())
        .with_status(200)
        .with_body(json!({ "id": "r-1", "pvzId": PVZ_ID, "status": "Closed" }).to_string())
        .expect(1)
        .create_async()
        .await;
    let list = server
        .mock("GET", "/pvz")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "1".into()),
            Matcher::UrlEncoded("limit".into(), "10".into()),
        ]))
        .match_header("authorization", employee_auth.as_str())
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let it = runner(&server, Flow::ReceptionCycle).run_iteration().await;

    let names: Vec<&str> = it.checks.iter().map(|c| c.name).collect();
    assert_eq!(
        names,
        [
            checks::DUMMY_LOGIN,
            checks::CREATE_PVZ,
            checks::DUMMY_LOGIN_EMPLOYEE,
            checks::CREATE_RECEPTION,
            checks::ADD_PRODUCT,
            checks::DELETE_LAST_PRODUCT,
            checks::CLOSE_RECEPTION,
            checks::LIST_PVZ,
        ]
    );
    assert!(it.all_passed(), "checks: {:?}", it.checks);

    let endpoints: Vec<Endpoint> = it.samples.iter().map(|s| s.endpoint).collect();
    assert_eq!(endpoints.last(), Some(&Endpoint::ListPvz));

    reception.assert_async().await;
    product.assert_async().await;
    delete.assert_async().await;
    close.assert_async().await;
    list.assert_async().await;
}

#[tokio::test]
async fn close_reception_check_requires_closed_status() {
    let mut server = Server::new_async().await;
    let _moderator = mock_login(&mut server, "moderator", MODERATOR_TOKEN).await;
    let _employee = mock_login(&mut server, "employee", EMPLOYEE_TOKEN).await;
    let _pvz = mock_create_pvz(&mut server, "Moscow").await;
    let _reception = server
        .mock("POST", "/receptions")
        .with_status(200)
        .create_async()
        .await;
    let _product = mock_add_product(&mut server, EMPLOYEE_TOKEN).await;
    let _delete = server
        .mock("POST", format!("/pvz/{PVZ_ID}/delete_last_product").as_str())
        .with_status(200)
        .create_async()
        .await;
    let _close = server
        .mock("POST", format!("/pvz/{PVZ_ID}/close_last_reception").as_str())
        .with_status(200)
        .with_body(json!({ "status": "in_progress" }).to_string())
        .create_async()
        .await;
    let _list = server
        .mock("GET", "/pvz")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let it = runner(&server, Flow::ReceptionCycle).run_iteration().await;

    let failed: Vec<&str> = it
        .checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.name)
        .collect();
    assert_eq!(failed, [checks::CLOSE_RECEPTION]);
}
