//! Message layouts of a running session.

use super::state::{Answer, QuizSession};
use crate::{action::Action, chat::Outgoing};
use model::{Hint, Question};
use twilight_model::channel::message::{
    component::{ActionRow, Button, ButtonStyle},
    embed::{EmbedField, EmbedFooter, EmbedImage},
    Component, Embed,
};

const OPTIONS_PER_ROW: usize = 4;
const HINTS_PER_ROW: usize = 5;

const BRAND: u32 = 0x236EA5;
const SUCCESS: u32 = 0x2ECC71;
const FAILURE: u32 = 0xE74C3C;

const MEDALS: [&str; 3] = ["\u{1F947}", "\u{1F948}", "\u{1F949}"];

pub fn embed(title: String, description: Option<String>, color: u32) -> Embed {
    Embed {
        author: None,
        color: Some(color),
        description,
        fields: Vec::new(),
        footer: None,
        image: None,
        kind: String::from("rich"),
        provider: None,
        thumbnail: None,
        timestamp: None,
        title: Some(title),
        url: None,
        video: None,
    }
}

pub fn field(name: &str, value: String, inline: bool) -> EmbedField {
    EmbedField { inline, name: String::from(name), value }
}

fn button(action: Action, label: String, style: ButtonStyle) -> Component {
    Component::Button(Button {
        custom_id: Some(action.to_string()),
        disabled: false,
        emoji: None,
        label: Some(label),
        style,
        url: None,
    })
}

fn rows(buttons: Vec<Component>, per_row: usize) -> impl Iterator<Item = Component> {
    let mut buttons = buttons.into_iter().peekable();
    core::iter::from_fn(move || {
        buttons.peek()?;
        let components = buttons.by_ref().take(per_row).collect();
        Some(Component::ActionRow(ActionRow { components }))
    })
}

fn join_embed(session: &QuizSession) -> Embed {
    let description = session.quiz.description.clone().unwrap_or_else(|| String::from("A new quiz is about to begin!"));
    let mut embed = embed(session.quiz.title.clone(), Some(description), BRAND);
    embed.fields = vec![
        field("Starts in", format!("{} seconds", session.wait), true),
        field("Participants", session.participants.len().to_string(), true),
    ];
    embed
}

pub fn join_prompt(session: &QuizSession) -> Outgoing {
    let buttons = vec![
        button(Action::Join(session.id), String::from("Join"), ButtonStyle::Primary),
        button(Action::Begin(session.id), String::from("Start Now"), ButtonStyle::Success),
    ];
    Outgoing {
        embeds: vec![join_embed(session)],
        components: rows(buttons, OPTIONS_PER_ROW).collect(),
        ..Default::default()
    }
}

/// The join prompt's embed with a refreshed participant count.
pub fn join_progress(session: &QuizSession) -> Vec<Embed> {
    vec![join_embed(session)]
}

fn question_embed(session: &QuizSession, question: &Question, limit: u32) -> Embed {
    let title = format!("Question {} of {}", session.current + 1, session.questions.len());
    let mut embed = embed(title, Some(question.text.clone()), BRAND);
    embed.fields = vec![
        field("Points", question.points.to_string(), true),
        field("Time limit", format!("{limit} seconds"), true),
        field("Participants", session.participants.len().to_string(), true),
    ];
    embed
}

/// Message content of an open question, with the live answer counter.
pub fn progress(session: &QuizSession, question: &Question) -> String {
    let answered = session.answered_count(session.current);
    format!("{}\n-# {answered} of {} answered", question.text, session.participants.len())
}

/// File name under which an image is attached, and the alt text shown beneath it.
pub fn image_caption(question: &Question) -> Option<(String, String)> {
    let image = question.image.as_deref()?;
    let filename = std::path::Path::new(image).file_name()?.to_string_lossy().into_owned();
    let alt = question.image_alt.clone().unwrap_or_else(|| filename.clone());
    Some((filename, alt))
}

pub fn question(
    session: &QuizSession,
    question: &Question,
    hints: &[Hint],
    limit: u32,
    attached: Option<&str>,
) -> Outgoing {
    let mut embed = question_embed(session, question, limit);
    if let Some((filename, alt)) = image_caption(question) {
        embed.footer = Some(EmbedFooter { icon_url: None, proxy_icon_url: None, text: alt });
        if attached == Some(filename.as_str()) {
            embed.image =
                Some(EmbedImage { height: None, proxy_url: None, url: format!("attachment://{filename}"), width: None });
        }
    }

    let index = session.current;
    let options = question
        .options
        .iter()
        .enumerate()
        .map(|(option, label)| {
            let action = Action::Answer { session: session.id, question: index, option };
            button(action, label.clone(), ButtonStyle::Secondary)
        })
        .collect();
    let mut components: Vec<_> = rows(options, OPTIONS_PER_ROW).collect();

    let hints: Vec<_> = hints
        .iter()
        .take(HINTS_PER_ROW)
        .enumerate()
        .map(|(hint, Hint { title, .. })| {
            let action = Action::Hint { session: session.id, question: index, hint };
            button(action, title.clone(), ButtonStyle::Primary)
        })
        .collect();
    components.extend(rows(hints, HINTS_PER_ROW));

    Outgoing { content: Some(progress(session, question)), embeds: vec![embed], components, attachment: None }
}

pub fn results(session: &QuizSession, question: &Question) -> Outgoing {
    let index = session.current;
    let correct = question.correct_option().unwrap_or("?");
    let answered = session.answered_count(index);
    let right = session.correct_count(index);

    let mut embed = embed(format!("The answer was: {correct}"), None, if right > 0 { SUCCESS } else { FAILURE });
    embed.fields = vec![
        field("Correct", format!("{right} of {answered} answers"), true),
        field("Participants", session.participants.len().to_string(), true),
    ];
    if let Some(fastest) = session.fastest {
        embed.fields.push(field("Fastest", format!("<@{fastest}>"), true));
    }
    Outgoing { embeds: vec![embed], ..Default::default() }
}

pub fn standings(session: &QuizSession, elapsed: u32) -> Outgoing {
    let ranked = super::scoring::standings(session.participants.values());
    let lines: Vec<_> = ranked
        .iter()
        .enumerate()
        .map(|(position, participant)| {
            let place = MEDALS.get(position).map_or_else(|| format!("**{}.**", position + 1), |medal| medal.to_string());
            let correct = participant.correct_count();
            format!(
                "{place} <@{}> with **{}** points ({correct} of {} correct)",
                participant.user,
                participant.score,
                session.questions.len()
            )
        })
        .collect();

    let mut embed = embed(format!("Final standings: {}", session.quiz.title), Some(lines.join("\n")), BRAND);
    embed.fields = vec![field("Duration", format!("{elapsed} seconds"), true)];
    Outgoing { embeds: vec![embed], ..Default::default() }
}

pub fn cancelled(session: &QuizSession) -> Outgoing {
    let description = if session.questions.is_empty() {
        String::from("This quiz has no questions.")
    } else {
        String::from("Nobody joined in time.")
    };
    let embed = embed(format!("Quiz cancelled: {}", session.quiz.title), Some(description), FAILURE);
    Outgoing { embeds: vec![embed], ..Default::default() }
}

pub fn stopped(session: &QuizSession) -> Outgoing {
    let embed = embed(
        format!("Quiz stopped: {}", session.quiz.title),
        Some(String::from("This quiz was stopped by an administrator.")),
        FAILURE,
    );
    Outgoing { embeds: vec![embed], ..Default::default() }
}

/// Private reply to the answering participant.
pub fn feedback(answer: &Answer) -> String {
    match (answer.correct, answer.fastest) {
        (true, true) => format!("Correct, and first! You earned **{}** points.", answer.points),
        (true, false) => format!("Correct! You earned **{}** points.", answer.points),
        (false, _) => String::from("Sorry, that is not the right answer."),
    }
}
