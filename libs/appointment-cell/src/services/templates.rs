// libs/appointment-cell/src/services/templates.rs
use chrono::{DateTime, FixedOffset, Utc};

use crate::models::MessageTemplateKind;

pub fn default_template(kind: MessageTemplateKind) -> &'static str {
    match kind {
        MessageTemplateKind::Confirmation => {
            "Olá {name}! Seu agendamento de {service} foi marcado para {date} às {time}."
        }
        MessageTemplateKind::Reminder => {
            "Olá {name}! Lembrete: você tem {service} agendado para {date} às {time}. Podemos confirmar?"
        }
        MessageTemplateKind::Cancellation => {
            "Olá {name}, seu agendamento de {service} do dia {date} às {time} foi cancelado."
        }
        MessageTemplateKind::Reschedule => {
            "Olá {name}! Seu agendamento de {service} foi remarcado para {date} às {time}."
        }
        MessageTemplateKind::ConfirmationReply => {
            "Obrigado, {name}! Sua presença em {date} às {time} está confirmada."
        }
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub name: String,
    pub service: String,
    pub start_time: DateTime<Utc>,
    pub local_offset: FixedOffset,
}

impl TemplateContext {
    pub fn date(&self) -> String {
        self.start_time.with_timezone(&self.local_offset).format("%d/%m/%Y").to_string()
    }

    pub fn time(&self) -> String {
        self.start_time.with_timezone(&self.local_offset).format("%H:%M").to_string()
    }
}

/// Replaces `{name}`, `{service}`, `{date}` and `{time}` in one pass, so
/// substituted values are never scanned again. Anything else in braces is
/// left as written.
pub fn render(template: &str, context: &TemplateContext) -> String {
    let mut rendered = String::with_capacity(template.len() + context.name.len() + context.service.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let candidate = &rest[open..];

        let Some(close) = candidate.find('}') else {
            rest = candidate;
            break;
        };

        match &candidate[1..close] {
            "name" => rendered.push_str(&context.name),
            "service" => rendered.push_str(&context.service),
            "date" => rendered.push_str(&context.date()),
            "time" => rendered.push_str(&context.time()),
            _ => {
                // Not a placeholder: keep the brace and rescan after it
                rendered.push('{');
                rest = &candidate[1..];
                continue;
            }
        }
        rest = &candidate[close + 1..];
    }

    rendered.push_str(rest);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> TemplateContext {
        TemplateContext {
            name: "Maria".to_string(),
            service: "Limpeza".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap(),
            local_offset: FixedOffset::west_opt(3 * 3600).unwrap(),
        }
    }

    #[test]
    fn test_renders_in_clinic_local_time() {
        let text = render(default_template(MessageTemplateKind::Confirmation), &context());
        assert_eq!(
            text,
            "Olá Maria! Seu agendamento de Limpeza foi marcado para 10/06/2024 às 09:00."
        );
    }

    #[test]
    fn test_unknown_placeholders_survive() {
        let text = render("{name} - {clinic}", &context());
        assert_eq!(text, "Maria - {clinic}");
    }

    #[test]
    fn test_customer_values_are_not_expanded() {
        let mut context = context();
        context.name = "{date} {service}".to_string();

        let text = render("Olá {name}, {time}", &context);
        assert_eq!(text, "Olá {date} {service}, 09:00");
    }

    #[test]
    fn test_stray_braces_are_kept() {
        assert_eq!(render("{{name}} {", &context()), "{Maria} {");
        assert_eq!(render("}{name", &context()), "}{name");
    }

    #[test]
    fn test_every_kind_has_a_default() {
        for kind in [
            MessageTemplateKind::Confirmation,
            MessageTemplateKind::Reminder,
            MessageTemplateKind::Cancellation,
            MessageTemplateKind::Reschedule,
            MessageTemplateKind::ConfirmationReply,
        ] {
            let text = render(default_template(kind), &context());
            assert!(text.contains("Maria"));
            assert!(text.contains("10/06/2024"));
        }
    }
}
