//! Integration tests for the interactive session without a terminal.
//!
//! The input controller is wired to a [`SessionHandle`] the same way the
//! terminal loop wires it, and keys are fed in directly.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyCode;
use fleetdeck_api::{Resource, ScriptedFleetApi};
use fleetdeck_core::TuiConfig;
use fleetdeck_tui::{
    InputController, InputEvent, ScreenId, SessionContext, SessionExit, SessionHandle, input,
};

fn session(api: Arc<ScriptedFleetApi>) -> (SessionHandle, InputController<InputEvent>) {
    let ctx = SessionContext::new(api, Some("acme".into()), TuiConfig::default());
    let handle = SessionHandle::new(ctx, ScreenId::Dashboard);
    let on_input = handle.clone();
    let on_error = handle.clone();
    let controller = InputController::new(
        8,
        move |event: InputEvent| {
            let handle = on_input.clone();
            async move { handle.handle_input(event).await }
        },
        input::is_critical,
        move |err: anyhow::Error| on_error.report_error(&format!("{err:#}")),
    );
    (handle, controller)
}

async fn wait_for_exit(handle: &SessionHandle) -> SessionExit {
    tokio::time::timeout(Duration::from_secs(2), handle.wait_for_exit())
        .await
        .expect("session did not exit")
}

#[tokio::test]
async fn test_hotkeys_switch_screens_in_order() {
    let api = Arc::new(ScriptedFleetApi::demo());
    let (handle, controller) = session(api);

    for c in ['2', '3', '4'] {
        controller.dispatch(InputEvent::char(c));
    }
    controller.wait_idle().await;
    assert_eq!(handle.active_screen(), ScreenId::Incidents);

    controller.dispatch(InputEvent::key(KeyCode::Tab));
    controller.wait_idle().await;
    assert_eq!(handle.active_screen(), ScreenId::Tickets);
}

#[tokio::test]
async fn test_quit_key_ends_session() {
    let api = Arc::new(ScriptedFleetApi::demo());
    let (handle, controller) = session(api);

    controller.dispatch(InputEvent::char('q'));
    assert_eq!(wait_for_exit(&handle).await, SessionExit::Quit);
}

#[tokio::test]
async fn test_ctrl_c_interrupts_through_help_modal() {
    let api = Arc::new(ScriptedFleetApi::demo());
    let (handle, controller) = session(api);

    controller.dispatch(InputEvent::char('?'));
    controller.wait_idle().await;
    assert!(handle.modal().is_some());

    controller.dispatch(InputEvent::ctrl('c'));
    assert_eq!(wait_for_exit(&handle).await, SessionExit::Interrupted);
}

#[tokio::test]
async fn test_manual_refresh_loads_mounted_screen() {
    let api = Arc::new(ScriptedFleetApi::demo());
    let (handle, controller) = session(api.clone());

    controller.dispatch(InputEvent::char('2'));
    controller.wait_idle().await;
    controller.dispatch(InputEvent::char('r'));
    controller.wait_idle().await;

    for _ in 0..100 {
        if api.calls(Resource::Devices) >= 2 && !handle.is_refreshing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(api.calls(Resource::Devices) >= 1);
    let view = handle.view(0);
    assert_eq!(view.active, ScreenId::Devices);
    assert!(!view.fallback);
}
