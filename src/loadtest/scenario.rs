//! Scenario runner: the request sequence executed once per iteration.
//!
//! Every flow is strictly sequential. Values extracted from one response
//! (bearer tokens, the pickup point id) feed later requests through a
//! [`SessionContext`] that lives for a single iteration. A failed request or
//! check never ends the iteration early: later steps run with whatever the
//! context holds, and fail their own checks if a value is missing.

use crate::loadtest::checks::{self, CheckOutcome};
use crate::loadtest::client::{PvzClient, RequestOutcome, Role};
use crate::loadtest::config::{Flow, ScenarioConfig};
use crate::loadtest::metrics::{MetricEvent, RequestSample};

/// Page requested when listing pickup points.
const LIST_PAGE: u32 = 1;
/// Page size requested when listing pickup points.
const LIST_LIMIT: u32 = 10;

/// Per-iteration state. Never shared between iterations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Moderator bearer token.
    pub token: Option<String>,
    /// Id of the pickup point created in this iteration.
    pub pvz_id: Option<String>,
    /// Employee bearer token, in flows that log in twice.
    pub employee_token: Option<String>,
}

/// Everything one iteration produced.
#[derive(Debug, Default)]
pub struct IterationOutcome {
    /// Checks in execution order.
    pub checks: Vec<CheckOutcome>,
    /// Request samples in execution order.
    pub samples: Vec<RequestSample>,
    /// Final session state.
    pub session: SessionContext,
}

impl IterationOutcome {
    fn observe(&mut self, outcome: &RequestOutcome) {
        self.samples.push(RequestSample::from_outcome(outcome));
    }

    fn check(&mut self, check: CheckOutcome) {
        self.checks.push(check);
    }

    /// `true` when every check passed.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Converts the outcome into metric events, requests first.
    pub fn into_events(self) -> impl Iterator<Item = MetricEvent> {
        self.samples
            .into_iter()
            .map(MetricEvent::Request)
            .chain(self.checks.into_iter().map(MetricEvent::Check))
    }
}

/// Runs one scenario's flow against the target service.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    client: PvzClient,
    flow: Flow,
    city: String,
    product_type: String,
}

impl ScenarioRunner {
    /// Creates a runner for `flow` with explicit request parameters.
    pub fn new(
        client: PvzClient,
        flow: Flow,
        city: impl Into<String>,
        product_type: impl Into<String>,
    ) -> Self {
        Self {
            client,
            flow,
            city: city.into(),
            product_type: product_type.into(),
        }
    }

    /// Creates a runner from a scenario's configuration.
    pub fn from_config(client: PvzClient, scenario: &ScenarioConfig) -> Self {
        Self::new(
            client,
            scenario.flow,
            scenario.city.clone(),
            scenario.product_type.clone(),
        )
    }

    /// Flow this runner executes.
    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// Execute one iteration of the configured flow.
    pub async fn run_iteration(&self) -> IterationOutcome {
        match self.flow {
            Flow::ModeratorProduct => self.moderator_product().await,
            Flow::DualRole => self.dual_role().await,
            Flow::ReceptionCycle => self.reception_cycle().await,
        }
    }

    /// Moderator logs in, creates a pickup point, adds a product to it.
    pub async fn moderator_product(&self) -> IterationOutcome {
        let mut it = IterationOutcome::default();
        self.create_pvz_as_moderator(&mut it).await;

        let product = self
            .client
            .add_product(
                it.session.token.as_deref(),
                it.session.pvz_id.as_deref(),
                &self.product_type,
            )
            .await;
        it.observe(&product);
        it.check(checks::status_is(checks::ADD_PRODUCT, &product, 201));
        it
    }

    /// Moderator logs in and creates a pickup point, then an employee logs in.
    ///
    /// The employee token is captured but not used by any later request.
    pub async fn dual_role(&self) -> IterationOutcome {
        let mut it = IterationOutcome::default();
        self.create_pvz_as_moderator(&mut it).await;
        self.login_employee(&mut it).await;
        it
    }

    /// Full reception lifecycle: open a reception on a fresh pickup point,
    /// add and remove a product, close the reception, then list pickup points.
    pub async fn reception_cycle(&self) -> IterationOutcome {
        let mut it = IterationOutcome::default();
        self.create_pvz_as_moderator(&mut it).await;
        self.login_employee(&mut it).await;

        let employee = it.session.employee_token.clone();
        let pvz_id = it.session.pvz_id.clone();

        let reception = self
            .client
            .create_reception(employee.as_deref(), pvz_id.as_deref())
            .await;
        it.observe(&reception);
        it.check(checks::status_is(checks::CREATE_RECEPTION, &reception, 200));

        let product = self
            .client
            .add_product(employee.as_deref(), pvz_id.as_deref(), &self.product_type)
            .await;
        it.observe(&product);
        it.check(checks::status_is(checks::ADD_PRODUCT, &product, 201));

        let deleted = self
            .client
            .delete_last_product(employee.as_deref(), pvz_id.as_deref())
            .await;
        it.observe(&deleted);
        it.check(checks::status_is(checks::DELETE_LAST_PRODUCT, &deleted, 200));

        let closed = self
            .client
            .close_last_reception(employee.as_deref(), pvz_id.as_deref())
            .await;
        it.observe(&closed);
        it.check(checks::status_and_field_ignore_case(
            checks::CLOSE_RECEPTION,
            &closed,
            200,
            "status",
            "closed",
        ));

        let list = self
            .client
            .list_pvz(employee.as_deref(), LIST_PAGE, LIST_LIMIT)
            .await;
        it.observe(&list);
        it.check(checks::status_is(checks::LIST_PVZ, &list, 200));
        it
    }

    /// Shared prefix: moderator login followed by pickup point creation.
    async fn create_pvz_as_moderator(&self, it: &mut IterationOutcome) {
        let login = self.client.dummy_login(Role::Moderator).await;
        it.observe(&login);
        it.check(checks::status_is(checks::DUMMY_LOGIN, &login, 200));
        it.session.token = login.extract("token");

        let pvz = self
            .client
            .create_pvz(it.session.token.as_deref(), &self.city)
            .await;
        it.observe(&pvz);
        it.check(checks::status_and_field(
            checks::CREATE_PVZ,
            &pvz,
            201,
            "city",
            &self.city,
        ));
        it.session.pvz_id = pvz.extract("id");
    }

    async fn login_employee(&self, it: &mut IterationOutcome) {
        let login = self.client.dummy_login(Role::Employee).await;
        it.observe(&login);
        it.check(checks::status_is(checks::DUMMY_LOGIN_EMPLOYEE, &login, 200));
        it.session.employee_token = login.extract("token");
    }
}
