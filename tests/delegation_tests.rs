//! Agents asking each other for help through a shared directory.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{connect, settings, time_registry, EventLog, MockTransport, Reply};
use dumplings::agent::{Agent, AgentDirectory, AgentEvent, AgentHandle};
use dumplings::config::LoopLimits;
use dumplings::error::MeshError;
use dumplings::provider::{ChatEventStream, ChatRequest, ChatResponse, ChatTransport};
use tokio::sync::Barrier;
use dumplings::types::Role;
use pretty_assertions::assert_eq;

struct Mesh {
    directory: AgentDirectory,
    scheduler: Arc<AgentHandle>,
    timekeeper: Arc<AgentHandle>,
    scheduler_events: EventLog,
}

async fn mesh(
    scheduler_script: Arc<MockTransport>,
    timekeeper_script: Arc<MockTransport>,
    limits: LoopLimits,
) -> Mesh {
    let registry = time_registry();
    let (scheduler, scheduler_events) =
        connect(settings("scheduling_agent"), &registry, &scheduler_script, limits).await;
    let (timekeeper, _) = connect(settings("time_agent"), &registry, &timekeeper_script, limits).await;

    let directory = AgentDirectory::new();
    let scheduler = directory.insert(scheduler).unwrap();
    let timekeeper = directory.insert(timekeeper).unwrap();
    Mesh {
        directory,
        scheduler,
        timekeeper,
        scheduler_events,
    }
}

const ASK_TIME: &str =
    "<ask_for_help><agent_id>time_agent</agent_id><message>What time is it?</message></ask_for_help>";

#[tokio::test]
async fn delegated_answer_returns_to_the_caller() {
    let scheduler_script = MockTransport::scripted(vec![
        Reply::text(ASK_TIME),
        Reply::text("The meeting starts at 11:03."),
    ]);
    let timekeeper_script = MockTransport::scripted(vec![
        Reply::text("<get_time></get_time>"),
        Reply::text("It is 11:03."),
    ]);
    let mesh = mesh(scheduler_script.clone(), timekeeper_script.clone(), LoopLimits::default()).await;

    let outcome = mesh.scheduler.converse("When do we start?").await.unwrap();
    assert_eq!(outcome.text(), "The meeting starts at 11:03.");

    let helper_turn = timekeeper_script.turn_requests();
    assert_eq!(helper_turn.len(), 2);
    assert_eq!(helper_turn[0].messages[1].role, Role::User);
    assert_eq!(helper_turn[0].messages[1].text(), "What time is it?");

    let notice = scheduler_script.turn_requests()[1].messages.last().unwrap().text();
    assert_eq!(notice, "ask_for_help results: It is 11:03.");

    let events = mesh.scheduler_events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::Delegated { from, to } if from == "scheduling_agent" && to == "time_agent"
    )));

    // The helper keeps its own history of the exchange.
    assert_eq!(mesh.timekeeper.lock().await.conversation().len(), 5);
}

#[tokio::test]
async fn delegation_by_uuid_reaches_the_same_agent() {
    let timekeeper_script = MockTransport::scripted(vec![Reply::text("11:03 sharp")]);
    let scheduler_script = MockTransport::scripted(vec![]);
    let mesh = mesh(scheduler_script.clone(), timekeeper_script.clone(), LoopLimits::default()).await;

    let uuid = mesh.timekeeper.uuid().to_string();
    let by_uuid = mesh.directory.resolve(&uuid).unwrap();
    let by_name = mesh.directory.resolve("time_agent").unwrap();
    assert!(Arc::ptr_eq(&by_uuid, &by_name));

    let ask = format!(
        "<ask_for_help><agent_id>{uuid}</agent_id><message>time?</message></ask_for_help>"
    );
    let scheduler_script = MockTransport::scripted(vec![Reply::text(&ask), Reply::text("ok")]);
    let registry = time_registry();
    let (scheduler, _) = connect(
        settings("planner"),
        &registry,
        &scheduler_script,
        LoopLimits::default(),
    )
    .await;
    let planner = mesh.directory.insert(scheduler).unwrap();

    planner.converse("start?").await.unwrap();
    let notice = scheduler_script.turn_requests()[1].messages.last().unwrap().text();
    assert_eq!(notice, "ask_for_help results: 11:03 sharp");
}

#[tokio::test]
async fn delegating_back_up_the_chain_is_refused() {
    let scheduler_script = MockTransport::scripted(vec![
        Reply::text(ASK_TIME),
        Reply::text("Could not get the time."),
    ]);
    let timekeeper_script = MockTransport::scripted(vec![
        Reply::text(
            "<ask_for_help><agent_id>scheduling_agent</agent_id><message>You tell me</message></ask_for_help>",
        ),
        Reply::text("I was not allowed to ask back."),
    ]);
    let mesh = mesh(scheduler_script.clone(), timekeeper_script.clone(), LoopLimits::default()).await;

    let outcome = mesh.scheduler.converse("When do we start?").await.unwrap();
    assert_eq!(outcome.text(), "Could not get the time.");

    let refusal = timekeeper_script.turn_requests()[1].messages.last().unwrap().text();
    assert!(refusal.starts_with("ask_for_help results: Delegation to 'scheduling_agent' refused"), "{refusal}");

    // The refused target never received a nested request.
    assert_eq!(scheduler_script.turn_requests().len(), 2);
}

#[tokio::test]
async fn asking_yourself_is_refused() {
    let scheduler_script = MockTransport::scripted(vec![
        Reply::text(
            "<ask_for_help><agent_id>scheduling_agent</agent_id><message>hi me</message></ask_for_help>",
        ),
        Reply::text("fine"),
    ]);
    let mesh = mesh(scheduler_script.clone(), MockTransport::scripted(vec![]), LoopLimits::default()).await;

    mesh.scheduler.converse("loop?").await.unwrap();
    let refusal = scheduler_script.turn_requests()[1].messages.last().unwrap().text();
    assert!(refusal.contains("refused"), "{refusal}");
}

#[tokio::test]
async fn depth_limit_stops_delegation() {
    let scheduler_script = MockTransport::scripted(vec![Reply::text(ASK_TIME), Reply::text("alone")]);
    let timekeeper_script = MockTransport::scripted(vec![]);
    let limits = LoopLimits {
        max_delegation_depth: 0,
        ..LoopLimits::default()
    };
    let mesh = mesh(scheduler_script.clone(), timekeeper_script.clone(), limits).await;

    mesh.scheduler.converse("time?").await.unwrap();
    let refusal = scheduler_script.turn_requests()[1].messages.last().unwrap().text();
    assert!(refusal.contains("depth limit of 0"), "{refusal}");
    assert!(timekeeper_script.turn_requests().is_empty());
}

#[tokio::test]
async fn unknown_agent_is_reported_to_the_model() {
    let scheduler_script = MockTransport::scripted(vec![
        Reply::text(
            "<ask_for_help><agent_id>weather_agent</agent_id><message>rain?</message></ask_for_help>",
        ),
        Reply::text("nobody knows"),
    ]);
    let mesh = mesh(scheduler_script.clone(), MockTransport::scripted(vec![]), LoopLimits::default()).await;

    mesh.scheduler.converse("rain?").await.unwrap();
    let notice = scheduler_script.turn_requests()[1].messages.last().unwrap().text();
    assert!(notice.contains("weather_agent"), "{notice}");
}

#[tokio::test]
async fn list_agents_names_each_agent_once() {
    let scheduler_script = MockTransport::scripted(vec![
        Reply::text("<list_agents></list_agents>"),
        Reply::text("two agents"),
    ]);
    let mesh = mesh(scheduler_script.clone(), MockTransport::scripted(vec![]), LoopLimits::default()).await;

    mesh.scheduler.converse("who is there?").await.unwrap();
    let listing = scheduler_script.turn_requests()[1].messages.last().unwrap().text();
    let expected = format!(
        "list_agents results: Available agents:\n- scheduling_agent (UUID: {})\n- time_agent (UUID: {})",
        mesh.scheduler.uuid(),
        mesh.timekeeper.uuid()
    );
    assert_eq!(listing, expected);
}

/// Holds the first turn request until every agent sharing the barrier has
/// reached its own first turn request.
struct GatedTransport {
    inner: Arc<MockTransport>,
    barrier: Arc<Barrier>,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatTransport for GatedTransport {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, MeshError> {
        // Call 0 is the connectivity check.
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            self.barrier.wait().await;
        }
        self.inner.complete(request).await
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatEventStream, MeshError> {
        self.inner.stream(request).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crossed_delegation_from_two_tasks_does_not_hang() {
    let barrier = Arc::new(Barrier::new(2));
    let directory = AgentDirectory::new();
    let registry = time_registry();
    let mut scripts = Vec::new();
    for (name, peer) in [("scheduling_agent", "time_agent"), ("time_agent", "scheduling_agent")] {
        let script = MockTransport::scripted(vec![
            Reply::text(&format!(
                "<ask_for_help><agent_id>{peer}</agent_id><message>help</message></ask_for_help>"
            )),
            Reply::text("gave up"),
        ]);
        let transport = Arc::new(GatedTransport {
            inner: script.clone(),
            barrier: barrier.clone(),
            calls: AtomicUsize::new(0),
        });
        let agent = Agent::builder(settings(name))
            .with_registry(registry.clone())
            .with_transport(transport)
            .connect()
            .await
            .unwrap();
        directory.insert(agent).unwrap();
        scripts.push(script);
    }

    let scheduler = directory.resolve("scheduling_agent").unwrap();
    let timekeeper = directory.resolve("time_agent").unwrap();
    let first = tokio::spawn(async move { scheduler.converse("ask time_agent").await });
    let second = tokio::spawn(async move { timekeeper.converse("ask scheduling_agent").await });

    let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
        (first.await.unwrap(), second.await.unwrap())
    })
    .await
    .expect("crossed delegation should not block either agent");
    assert_eq!(first.unwrap().text(), "gave up");
    assert_eq!(second.unwrap().text(), "gave up");

    for script in scripts {
        let turn = script.turn_requests();
        assert_eq!(turn.len(), 2);
        let refusal = turn[1].messages.last().unwrap().text();
        assert!(refusal.contains("is busy with another request"), "{refusal}");
    }
}
