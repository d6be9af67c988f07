use std::path::Path;

use errgate::error::NotifyError;

use super::ToastTimeout;

pub(super) struct ToastParams<'a> {
    pub summary: &'a str,
    pub body: &'a str,
    pub timeout: ToastTimeout,
    pub appname: &'a str,
    pub icon: Option<&'a Path>,
}

#[cfg(target_os = "linux")]
pub(super) fn send_toast(params: &ToastParams<'_>) -> std::result::Result<(), NotifyError> {
    linux::send_toast(params)
}

#[cfg(not(target_os = "linux"))]
pub(super) fn send_toast(params: &ToastParams<'_>) -> std::result::Result<(), NotifyError> {
    tracing::debug!(summary = params.summary, "no desktop notification backend");
    Err(NotifyError::Unsupported)
}

#[cfg(target_os = "linux")]
mod linux {
    use errgate::error::NotifyError;
    use notify_rust::{Notification, Timeout as LibTimeout, Urgency};
    use tracing::trace;

    use super::super::ToastTimeout;
    use super::ToastParams;

    pub fn send_toast(params: &ToastParams<'_>) -> std::result::Result<(), NotifyError> {
        let mut builder = Notification::new();
        builder
            .summary(params.summary)
            .body(params.body)
            .appname(params.appname)
            .urgency(Urgency::Normal)
            .timeout(map_timeout(params.timeout));

        if let Some(icon_path) = params.icon {
            builder.icon(&icon_path.to_string_lossy());
        }

        builder.show().map_err(|err| {
            trace!(error = %err, "desktop notification failed");
            NotifyError::Backend
        })?;
        Ok(())
    }

    const fn map_timeout(timeout: ToastTimeout) -> LibTimeout {
        match timeout {
            ToastTimeout::Default => LibTimeout::Default,
            ToastTimeout::Never => LibTimeout::Never,
            ToastTimeout::Milliseconds(ms) => LibTimeout::Milliseconds(ms),
        }
    }
}
