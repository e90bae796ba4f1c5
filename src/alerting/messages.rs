//! Notification bodies: HTML email with plaintext fallback, and the webhook
//! JSON payload.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::database::{EventType, Instance, Target, TargetState};
use crate::notify::{EmailMessage, WebhookAlertPayload};
use crate::timezone::TimeZoneResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Down,
    DownRepeat,
    Recovered,
}

impl AlertKind {
    pub fn event_type(&self) -> EventType {
        match self {
            AlertKind::Down => EventType::AlertDown,
            AlertKind::DownRepeat => EventType::AlertDownRepeat,
            AlertKind::Recovered => EventType::AlertRecovered,
        }
    }

    fn headline(&self) -> &'static str {
        match self {
            AlertKind::Down => "DOWN",
            AlertKind::DownRepeat => "STILL DOWN",
            AlertKind::Recovered => "RECOVERED",
        }
    }
}

/// Everything a notification body needs, gathered by the evaluator.
pub struct AlertContext<'a> {
    pub kind: AlertKind,
    pub instance: &'a Instance,
    pub target: &'a Target,
    pub state: &'a TargetState,
    pub now: DateTime<Utc>,
    pub zone: Tz,
    pub public_base_url: Option<&'a str>,
}

pub fn webhook_payload(ctx: &AlertContext<'_>) -> WebhookAlertPayload {
    WebhookAlertPayload {
        event_type: ctx.kind.event_type().as_str().to_string(),
        instance_id: ctx.instance.instance_id.clone(),
        target_id: ctx.target.target_id,
        url: ctx.target.url.clone(),
        is_up: ctx.state.is_up,
        state_since_utc: ctx.state.state_since_utc,
        timestamp_utc: ctx.now,
        summary: ctx.state.last_summary.clone().unwrap_or_default(),
    }
}

pub fn email_message(ctx: &AlertContext<'_>, resolver: &TimeZoneResolver) -> EmailMessage {
    let headline = ctx.kind.headline();
    let subject = format!(
        "[{}] {} is {}",
        ctx.instance.display_name, ctx.target.url, headline
    );

    let since_label = if ctx.state.is_up { "Up since" } else { "Down since" };
    let since_local = resolver.to_local(ctx.state.state_since_utc, ctx.zone);
    let now_local = resolver.to_local(ctx.now, ctx.zone);
    let summary = ctx.state.last_summary.as_deref().unwrap_or("n/a");
    let final_url = ctx.state.last_final_url.as_deref().unwrap_or("n/a");

    let dashboard = ctx.public_base_url.map(|base| {
        format!(
            "{}/instances/{}",
            base.trim_end_matches('/'),
            ctx.instance.instance_id
        )
    });

    let mut html = String::new();
    html.push_str(&format!(
        "<h2>{} &mdash; {}</h2>\n",
        escape(&ctx.target.url),
        headline
    ));
    html.push_str("<table cellpadding=\"4\">\n");
    html.push_str(&format!(
        "<tr><td>Instance</td><td>{}</td></tr>\n",
        escape(&ctx.instance.display_name)
    ));
    html.push_str(&format!(
        "<tr><td>Checked at</td><td>{} ({} UTC)</td></tr>\n",
        now_local.format("%Y-%m-%d %H:%M:%S %Z"),
        ctx.now.format("%Y-%m-%d %H:%M:%S")
    ));
    html.push_str(&format!(
        "<tr><td>{}</td><td>{} ({} UTC)</td></tr>\n",
        since_label,
        since_local.format("%Y-%m-%d %H:%M:%S %Z"),
        ctx.state.state_since_utc.format("%Y-%m-%d %H:%M:%S")
    ));
    html.push_str(&format!(
        "<tr><td>Last check</td><td>{}</td></tr>\n",
        escape(summary)
    ));
    html.push_str(&format!(
        "<tr><td>Final URL</td><td>{}</td></tr>\n",
        escape(final_url)
    ));
    if let Some(ip) = &ctx.state.last_used_ip {
        html.push_str(&format!("<tr><td>IP</td><td>{}</td></tr>\n", escape(ip)));
    }
    html.push_str("</table>\n");
    if let Some(link) = &dashboard {
        html.push_str(&format!(
            "<p><a href=\"{}\">Open dashboard</a></p>\n",
            escape(link)
        ));
    }

    let mut text = String::new();
    text.push_str(&format!("{} is {}\n\n", ctx.target.url, headline));
    text.push_str(&format!("Instance:   {}\n", ctx.instance.display_name));
    text.push_str(&format!(
        "Checked at: {} ({} UTC)\n",
        now_local.format("%Y-%m-%d %H:%M:%S %Z"),
        ctx.now.format("%Y-%m-%d %H:%M:%S")
    ));
    text.push_str(&format!(
        "{}: {} ({} UTC)\n",
        since_label,
        since_local.format("%Y-%m-%d %H:%M:%S %Z"),
        ctx.state.state_since_utc.format("%Y-%m-%d %H:%M:%S")
    ));
    text.push_str(&format!("Last check: {}\n", summary));
    text.push_str(&format!("Final URL:  {}\n", final_url));
    if let Some(link) = &dashboard {
        text.push_str(&format!("\nDashboard: {}\n", link));
    }

    EmailMessage {
        subject,
        html_body: html,
        text_body: text,
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
