mod logging;
mod prompt;
mod renderer;
mod settings;

use live_track_lib::provider::{GpxReplayProvider, SimulatedWalkProvider};
use live_track_lib::{
    Capability, PermissionPrompt, SessionController, SessionState, Snapshot, StaticPrompt,
};
use prompt::ConsolePrompt;
use renderer::ConsoleRenderer;
use settings::Settings;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;

fn main() -> ExitCode {
    let settings = Settings::from_cli();
    logging::setup_logging();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!("Failed to build the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(settings)) {
        Ok(snapshot) => match snapshot.last_error {
            Some(kind) => {
                tracing::error!("Session ended with an error: {kind}");
                ExitCode::FAILURE
            }
            None => ExitCode::SUCCESS,
        },
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn build_controller(settings: &Settings) -> live_track_lib::Result<SessionController> {
    let builder = match &settings.gpx {
        Some(path) => SessionController::builder(GpxReplayProvider::open(path)?),
        None => {
            let mut foreground = SimulatedWalkProvider::new(settings.origin(), settings.seed);
            let mut background = foreground.companion(Capability::Background);
            if let Some(fixes) = settings.background_after {
                foreground = foreground.background_after(fixes);
            }
            if let Some(fixes) = settings.foreground_after {
                background = background.foreground_after(fixes);
            }
            SessionController::builder(foreground).background_provider(background)
        }
    };

    let prompt: Arc<dyn PermissionPrompt> = if settings.yes {
        Arc::new(StaticPrompt::granting())
    } else {
        Arc::new(ConsolePrompt)
    };

    Ok(builder
        .permission_prompt(prompt)
        .delivery_policy(settings.delivery_policy())
        .build())
}

/// Run one session to completion and return its final snapshot
async fn run(settings: Settings) -> live_track_lib::Result<Snapshot> {
    let controller = build_controller(&settings)?;

    let (state_tx, mut state_rx) = watch::channel(SessionState::Idle);
    let mut renderer = ConsoleRenderer::new();
    let subscription = controller.subscribe(move |snapshot| {
        renderer.render(snapshot);
        state_tx.send_replace(snapshot.state);
    });

    controller.start(settings.tracking_config()).await?;

    let duration = settings.duration();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        _ = async {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        } => tracing::info!("Tracking duration elapsed"),
        _ = state_rx.wait_for(SessionState::is_finished) => {}
    }

    controller.stop().await;
    subscription.finished().await;

    let snapshot = controller.current_snapshot();
    let counts = controller.fix_counts();
    println!(
        "Recorded {} points over {} ({} fixes accepted, {} rejected)",
        snapshot.track.len(),
        snapshot.distance_label(),
        counts.accepted,
        counts.rejected
    );
    Ok(snapshot)
}
