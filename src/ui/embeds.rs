use serenity::all::{CreateEmbed, CreateEmbedFooter, Timestamp};
use std::time::Duration;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Lavabot";

/// Embed de un requisito no cumplido. Solo lleva título.
pub fn create_error_embed(title: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .color(colors::ERROR_RED)
}

/// Embed con un campo por entrada, en orden.
pub fn create_list_embed(title: &str, fields: &[(String, String)]) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .color(colors::MUSIC_PURPLE)
        .fields(
            fields
                .iter()
                .map(|(name, value)| (field_text(name), field_text(value), false)),
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Discord rechaza campos vacíos o de más de 1024 caracteres.
fn field_text(text: &str) -> String {
    const MAX_FIELD_LEN: usize = 1024;

    if text.trim().is_empty() {
        return "-".to_string();
    }
    if text.chars().count() <= MAX_FIELD_LEN {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_FIELD_LEN - 1).collect();
    truncated.push('…');
    truncated
}

/// `m:ss`, o `h:mm:ss` a partir de una hora.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
