//! Terminal rendering of toasts and connection state.

#[cfg(feature = "colored-output")]
use colored::*;
use notify_center::{ConnectionState, NotificationRecord, Toast, ToastPresenter, ToastSeverity};

/// Prints toasts to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalToasts;

impl ToastPresenter for TerminalToasts {
    fn show(&self, toast: Toast) {
        println!("{}", render_toast(&toast));
    }
}

fn severity_label(severity: ToastSeverity) -> String {
    let label = format!("[{}]", severity.to_string().to_uppercase());
    #[cfg(feature = "colored-output")]
    {
        match severity {
            ToastSeverity::Info => label.blue().to_string(),
            ToastSeverity::Success => label.green().to_string(),
            ToastSeverity::Warning => label.yellow().to_string(),
            ToastSeverity::Error => label.red().bold().to_string(),
        }
    }
    #[cfg(not(feature = "colored-output"))]
    {
        label
    }
}

pub fn render_toast(toast: &Toast) -> String {
    let mut line = format!(
        "{} {} - {}",
        severity_label(toast.severity),
        toast.title,
        toast.message
    );
    if let Some(url) = &toast.action_url {
        line.push_str(&format!(" ({url})"));
    }
    line
}

pub fn render_record(record: &NotificationRecord) -> String {
    format!(
        "{} {} [{}] {}: {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.id,
        record.notification_type,
        record.title,
        record.message
    )
}

pub fn print_state(state: ConnectionState) {
    let text = format!("connection: {state}");
    #[cfg(feature = "colored-output")]
    {
        let text = match state {
            ConnectionState::Connected => text.green(),
            ConnectionState::Disconnected => text.red(),
            ConnectionState::Connecting | ConnectionState::Reconnecting => text.yellow(),
        };
        eprintln!("{text}");
    }
    #[cfg(not(feature = "colored-output"))]
    eprintln!("{text}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_toast_includes_action_url() {
        let mut toast = Toast::ephemeral_error("Connection test failed", "not connected");
        toast.action_url = Some("/settings".to_string());

        let line = render_toast(&toast);
        assert!(line.contains("ERROR"));
        assert!(line.contains("Connection test failed - not connected"));
        assert!(line.ends_with("(/settings)"));
    }
}
