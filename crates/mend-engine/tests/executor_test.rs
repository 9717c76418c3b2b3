mod support;

use mend_engine::config::ExecutorConfig;
use mend_engine::{
    ActionExecutor, ActionType, DriverError, ElementSnapshot, ExecutionStrategy, HealError,
    RefindStrategy,
};
use support::{FakeElement, FakePage};

fn executor(allow_scripted: bool) -> ActionExecutor {
    ActionExecutor::new(ExecutorConfig {
        allow_scripted_fallback: allow_scripted,
        ..ExecutorConfig::default()
    })
}

#[tokio::test]
async fn test_refind_prefers_test_id() {
    let mut page = FakePage::new(vec![
        FakeElement::new("button").attr("id", "save").text("Save"),
        FakeElement::new("button").attr("data-testid", "save-btn").text("Save"),
    ]);
    let snapshot = ElementSnapshot::builder("button")
        .test_id("save-btn")
        .id("save")
        .text("Save")
        .build();

    let report = executor(false)
        .execute(&mut page, ActionType::Click, &snapshot, None)
        .await
        .unwrap();

    assert_eq!(report.refind, Some(RefindStrategy::TestId));
    assert_eq!(page.actions, vec!["click e1"]);
}

#[tokio::test]
async fn test_refind_skips_auto_generated_id() {
    let mut page = FakePage::new(vec![
        FakeElement::new("input").attr("id", "ember-1234"),
        FakeElement::new("input").attr("name", "email"),
    ]);
    let snapshot = ElementSnapshot::builder("input")
        .id("ember-1234")
        .name("email")
        .build();

    let report = executor(false)
        .execute(&mut page, ActionType::Type, &snapshot, Some("a@b.c"))
        .await
        .unwrap();

    assert_eq!(report.refind, Some(RefindStrategy::Name));
    assert_eq!(
        page.element(1).attrs.get("value").map(String::as_str),
        Some("a@b.c")
    );
}

#[tokio::test]
async fn test_refind_rejects_ambiguous_aria_label() {
    let mut page = FakePage::new(vec![
        FakeElement::new("button").attr("aria-label", "Close"),
        FakeElement::new("button").attr("aria-label", "Close").text("Close dialog"),
    ]);
    let snapshot = ElementSnapshot::builder("button")
        .aria_label("Close")
        .text("Close  dialog")
        .build();

    let report = executor(false)
        .execute(&mut page, ActionType::Click, &snapshot, None)
        .await
        .unwrap();

    assert_eq!(report.refind, Some(RefindStrategy::TagText));
    assert_eq!(page.actions, vec!["click e1"]);
}

#[tokio::test]
async fn test_refind_exhausted() {
    let mut page = FakePage::new(vec![FakeElement::new("button").text("Other")]);
    let snapshot = ElementSnapshot::builder("button").text("Gone").build();

    let err = executor(false)
        .execute(&mut page, ActionType::Click, &snapshot, None)
        .await
        .unwrap_err();

    assert!(matches!(err, HealError::ElementNotRefindable { .. }));
    assert!(page.actions.is_empty());
}

#[tokio::test]
async fn test_click_falls_through_to_pointer() {
    let mut page = FakePage::new(vec![
        FakeElement::new("button")
            .attr("data-testid", "buy")
            .fail_on("click"),
    ]);
    let snapshot = ElementSnapshot::builder("button").test_id("buy").build();

    let report = executor(false)
        .execute(&mut page, ActionType::Click, &snapshot, None)
        .await
        .unwrap();

    assert_eq!(report.strategy, ExecutionStrategy::PointerClick);
    assert_eq!(report.attempts, 4);
    assert_eq!(page.actions, vec!["scroll e0", "wait e0", "pointer_click e0"]);
}

#[tokio::test]
async fn test_scripted_click_only_when_allowed() {
    let element = FakeElement::new("button")
        .attr("data-testid", "buy")
        .fail_on("click")
        .fail_on("pointer_click");
    let snapshot = ElementSnapshot::builder("button").test_id("buy").build();

    let mut page = FakePage::new(vec![element.clone()]);
    let err = executor(false)
        .execute(&mut page, ActionType::Click, &snapshot, None)
        .await
        .unwrap_err();
    match err {
        HealError::ActionExecutionFailed { action, source } => {
            assert_eq!(action, ActionType::Click);
            assert!(matches!(source, DriverError::NotInteractable { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(page.scripts.is_empty());

    let mut page = FakePage::new(vec![element]);
    let report = executor(true)
        .execute(&mut page, ActionType::Click, &snapshot, None)
        .await
        .unwrap();
    assert_eq!(report.strategy, ExecutionStrategy::ScriptedClick);
    assert_eq!(page.scripts, vec!["arguments[0].click();"]);
}

#[tokio::test]
async fn test_type_falls_back_to_scripted_value() {
    let mut page = FakePage::new(vec![
        FakeElement::new("input")
            .attr("id", "search")
            .fail_on("type"),
    ]);
    let snapshot = ElementSnapshot::builder("input").id("search").build();

    let report = executor(true)
        .execute(&mut page, ActionType::Type, &snapshot, Some("rust"))
        .await
        .unwrap();

    assert_eq!(report.strategy, ExecutionStrategy::ScriptedValue);
    assert!(page.scripts[0].starts_with(r#"arguments[0].value = "rust";"#));
}

#[tokio::test]
async fn test_select_fuzzy_matches_option_text() {
    let mut page = FakePage::new(vec![
        FakeElement::new("select")
            .attr("name", "state")
            .option("Colorado", "CO")
            .option("California", "CA"),
    ]);
    let snapshot = ElementSnapshot::builder("select").name("state").build();

    let report = executor(false)
        .execute(&mut page, ActionType::Select, &snapshot, Some("Califronia"))
        .await
        .unwrap();

    assert_eq!(report.strategy, ExecutionStrategy::SelectByText);
    assert_eq!(page.element(0).selected.as_deref(), Some("CA"));
}

#[tokio::test]
async fn test_select_falls_back_to_index() {
    let mut page = FakePage::new(vec![
        FakeElement::new("select")
            .attr("name", "size")
            .option("Small", "s")
            .option("Large", "l"),
    ]);
    let snapshot = ElementSnapshot::builder("select").name("size").build();

    let report = executor(false)
        .execute(&mut page, ActionType::Select, &snapshot, Some("1"))
        .await
        .unwrap();

    assert_eq!(report.strategy, ExecutionStrategy::SelectByIndex);
    assert_eq!(page.element(0).selected.as_deref(), Some("l"));
}

#[tokio::test]
async fn test_submit_falls_back_to_click() {
    let mut page = FakePage::new(vec![
        FakeElement::new("button")
            .attr("id", "send")
            .fail_on("submit"),
    ]);
    let snapshot = ElementSnapshot::builder("button").id("send").build();

    let report = executor(false)
        .execute(&mut page, ActionType::Submit, &snapshot, None)
        .await
        .unwrap();

    assert_eq!(report.strategy, ExecutionStrategy::ClickToSubmit);
}

#[tokio::test]
async fn test_missing_input_data() {
    let mut page = FakePage::new(vec![FakeElement::new("input").attr("id", "q")]);
    let snapshot = ElementSnapshot::builder("input").id("q").build();

    let err = executor(false)
        .execute(&mut page, ActionType::Type, &snapshot, None)
        .await
        .unwrap_err();

    assert!(matches!(err, HealError::MissingActionData(ActionType::Type)));
    assert!(page.queries.is_empty());
}

#[tokio::test]
async fn test_perform_refinds_detached_element() {
    let mut page = FakePage::new(vec![
        FakeElement::new("button").attr("id", "go").text("Go"),
        FakeElement::new("button").attr("id", "go").text("Go"),
    ]);
    page.detach(0);
    let snapshot = ElementSnapshot::builder("button").id("go").text("Go").build();

    let report = executor(false)
        .perform(
            &mut page,
            ActionType::Click,
            &FakePage::handle(0),
            &snapshot,
            None,
        )
        .await
        .unwrap();

    assert_eq!(report.refind, Some(RefindStrategy::Id));
    assert_eq!(page.actions, vec!["click e1"]);
}
