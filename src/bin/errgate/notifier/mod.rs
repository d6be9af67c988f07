mod backends;

use async_channel::Receiver;
use errgate::Result;
use errgate::config::NotifySettings;
use errgate::error::Error as GateError;
use errgate::types::Notification;
use tracing::{error, info};

use backends::ToastParams;

pub async fn run_notifier(rx: Receiver<Notification>, notify: NotifySettings, dry_run: bool) {
    while let Ok(notification) = rx.recv().await {
        if dry_run {
            info!(
                message = %notification.message,
                short_message = notification.short_message.as_deref().unwrap_or("-"),
                "dry-run: would emit notification"
            );
            continue;
        }

        if let Err(err) = send_notification(&notify, &notification) {
            error!(error = %err, message = %notification.message, "failed to send notification");
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ToastTimeout {
    Default,
    Never,
    Milliseconds(u32),
}

fn send_notification(notify: &NotifySettings, notification: &Notification) -> Result<()> {
    let timeout_ms = notify.timeout.and_then(|dur| u32::try_from(dur.as_millis()).ok());
    let timeout = compute_timeout(notify.sticky, timeout_ms, notify.default_timeout);
    let summary = toast_summary(&notify.appname, notification);

    let params = ToastParams {
        summary: &summary,
        body: &notification.message,
        timeout,
        appname: &notify.appname,
        icon: notify.icon.as_deref(),
    };

    backends::send_toast(&params).map_err(GateError::from)
}

fn toast_summary(appname: &str, notification: &Notification) -> String {
    match notification.short_message.as_deref() {
        Some(short) if !short.trim().is_empty() => format!("{appname}: {short}"),
        _ => appname.to_string(),
    }
}

const fn compute_timeout(
    sticky: bool,
    timeout_ms: Option<u32>,
    default_timeout: bool,
) -> ToastTimeout {
    if sticky {
        ToastTimeout::Never
    } else if let Some(ms) = timeout_ms {
        ToastTimeout::Milliseconds(ms)
    } else if default_timeout {
        ToastTimeout::Default
    } else {
        ToastTimeout::Milliseconds(5_000)
    }
}
