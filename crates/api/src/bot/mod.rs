pub mod error;

use crate::{
    action::Action,
    chat::ChannelId,
    discord::interaction_time,
    generate::generate,
    leaderboard::Entry,
    session::{self, AnswerEvent, Caller, Runner, StartRequest},
};
use chrono::Utc;
use core::num::NonZeroU64;
use db::{NewQuiz, Period, Quiz, QuizFilter};
use twilight_model::{
    application::interaction::{
        application_command::{CommandData, CommandDataOption, CommandOptionValue},
        Interaction, InteractionData, InteractionType,
    },
    channel::message::MessageFlags,
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::{
        marker::{ApplicationMarker, UserMarker},
        Id,
    },
    user::User,
};

type AppId = Id<ApplicationMarker>;
type UserId = Id<UserMarker>;

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 25;
const DEFAULT_GENERATED: i64 = 10;
const MAX_GENERATED: i64 = 50;
const GENERATED_POINTS: u32 = 10;
const MAX_WAIT: i64 = 600;

const HELP: [(&str, &str); 8] = [
    ("/start quiz [wait] [private]", "Opens a quiz in this channel. Private quizzes run in your direct messages."),
    ("/stop", "Stops the quiz running in this channel. Nothing is recorded."),
    ("/leaderboard [period] [limit]", "Top players of the week, month, year, or of all time."),
    ("/stats [user]", "All-time totals and global rank of a player."),
    ("/quizzes", "Lists the quizzes that can be started."),
    ("/delete quiz", "Deletes a quiz along with its questions and results."),
    ("/generate corpus title [count]", "Builds a new quiz from a corpus."),
    ("/help", "Shows this message."),
];

fn option<'o>(options: &'o [CommandDataOption], name: &str) -> Option<&'o CommandOptionValue> {
    options.iter().find(|option| option.name == name).map(|option| &option.value)
}

fn string_option<'o>(options: &'o [CommandDataOption], name: &str) -> error::Result<Option<&'o str>> {
    match option(options, name) {
        None => Ok(None),
        Some(CommandOptionValue::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(error::Error::InvalidParams),
    }
}

fn integer_option(options: &[CommandDataOption], name: &str) -> error::Result<Option<i64>> {
    match option(options, name) {
        None => Ok(None),
        Some(CommandOptionValue::Integer(value)) => Ok(Some(*value)),
        Some(_) => Err(error::Error::InvalidParams),
    }
}

fn reply(data: InteractionResponseData) -> InteractionResponse {
    InteractionResponse { kind: InteractionResponseType::ChannelMessageWithSource, data: Some(data) }
}

fn ephemeral(content: String) -> InteractionResponse {
    reply(InteractionResponseData { content: Some(content), flags: Some(MessageFlags::EPHEMERAL), ..Default::default() })
}

fn entry_line(entry: &Entry) -> String {
    let name = entry.username.clone().unwrap_or_else(|| format!("<@{}>", entry.user));
    let plural = if entry.quizzes == 1 { "" } else { "zes" };
    format!("**{}.** {name}: **{}** points in {} quiz{plural}", entry.rank, entry.total_score, entry.quizzes)
}

/// Interaction front-end. Every handler reports failures as an ephemeral message.
pub struct Bot {
    runner: Runner,
    id: AppId,
}

impl Bot {
    pub fn new(runner: Runner, id: NonZeroU64) -> Self {
        Self { runner, id: Id::from(id) }
    }

    pub async fn on_message(&self, interaction: Interaction) -> InteractionResponse {
        if interaction.application_id != self.id {
            log::warn!("interaction {} addressed to application {}", interaction.id, interaction.application_id);
            return ephemeral(error::Error::UnsupportedInteraction.to_string());
        }

        let result = match interaction.kind {
            InteractionType::Ping => Ok(InteractionResponse { kind: InteractionResponseType::Pong, data: None }),
            InteractionType::ApplicationCommand => self.on_app_command(interaction).await,
            InteractionType::MessageComponent => self.on_msg_component(interaction).await,
            _ => Err(error::Error::UnsupportedInteraction),
        };

        let err = match result {
            Ok(res) => return res,
            Err(err) => err,
        };

        if let error::Error::Session(inner) = &err {
            use session::error::ErrorKind;
            match inner.kind() {
                ErrorKind::Persistence | ErrorKind::Delivery => log::error!("interaction failed: {inner:?}"),
                _ => log::debug!("interaction rejected: {inner}"),
            }
        }
        ephemeral(err.to_string())
    }

    async fn on_app_command(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let user = interaction.member.and_then(|member| member.user).or(interaction.user).ok_or(error::Error::UnknownUser)?;
        let channel = interaction.channel.map(|channel| channel.id);
        let data = interaction.data.ok_or(error::Error::Fatal)?;
        let InteractionData::ApplicationCommand(data) = data else {
            return Err(error::Error::Fatal);
        };

        let CommandData { name, options, .. } = *data;
        log::debug!("command /{name} from user {}", user.id);
        match name.as_str() {
            "start" => self.on_start_command(user, channel, &options).await,
            "stop" => self.on_stop_command(channel).await,
            "leaderboard" => self.on_leaderboard_command(&options).await,
            "stats" => self.on_stats_command(user.id, &options).await,
            "quizzes" => self.on_quizzes_command().await,
            "delete" => self.on_delete_command(user.id, &options).await,
            "generate" => self.on_generate_command(user.id, &options).await,
            "help" => Ok(Self::on_help_command()),
            _ => Err(error::Error::UnknownCommandName),
        }
    }

    /// Looks a quiz up by id when the reference is numeric, otherwise by title.
    async fn resolve_quiz(&self, reference: &str) -> error::Result<Quiz> {
        let repo = self.runner.repo();
        let quiz = match reference.parse::<i64>() {
            Ok(id) => repo.find_quiz(id).await?,
            Err(_) => repo.find_quiz_by_title(reference).await?,
        };
        quiz.ok_or(error::Error::UnknownQuiz)
    }

    async fn on_start_command(
        &self,
        user: User,
        channel: Option<ChannelId>,
        options: &[CommandDataOption],
    ) -> error::Result<InteractionResponse> {
        let channel = channel.ok_or(error::Error::MissingChannel)?;
        let reference = string_option(options, "quiz")?.ok_or(error::Error::InvalidParams)?;
        let wait = integer_option(options, "wait")?
            .map(|wait| u32::try_from(wait.clamp(0, MAX_WAIT)))
            .transpose()
            .map_err(|_| error::Error::InvalidParams)?;
        let private = match option(options, "private") {
            None => false,
            Some(CommandOptionValue::Boolean(private)) => *private,
            Some(_) => return Err(error::Error::InvalidParams),
        };

        let quiz = self.resolve_quiz(reference).await?;
        let private = private || quiz.private;
        let request = StartRequest { channel, quiz: quiz.id, wait, persist: true, private, owner: Some(user.id) };
        self.runner.start(request).await?;

        let content = if private {
            format!("**{}** is starting in your direct messages.", quiz.title)
        } else {
            let wait = wait.unwrap_or(self.runner.settings().join_wait);
            format!("**{}** is open for participants for {wait} seconds.", quiz.title)
        };
        Ok(ephemeral(content))
    }

    async fn on_stop_command(&self, channel: Option<ChannelId>) -> error::Result<InteractionResponse> {
        let channel = channel.ok_or(error::Error::MissingChannel)?;
        let id = self.runner.by_channel(channel).await.ok_or(error::Error::NoActiveQuiz)?;
        self.runner.stop(id).await?;
        Ok(ephemeral(String::from("The quiz has been stopped.")))
    }

    async fn on_leaderboard_command(&self, options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        let period = match string_option(options, "period")? {
            Some(period) => period.parse().map_err(|_| error::Error::InvalidParams)?,
            None => Period::Weekly,
        };
        let limit = integer_option(options, "limit")?.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let limit = usize::try_from(limit).map_err(|_| error::Error::InvalidParams)?;

        let entries = self.runner.leaderboard().leaderboard(period, limit).await?;
        let description = if entries.is_empty() {
            String::from("Nobody has finished a quiz in this period yet.")
        } else {
            entries.iter().map(entry_line).collect::<Vec<_>>().join("\n")
        };
        let embed = session::embed(format!("Leaderboard ({period})"), Some(description), 0xF1C40F);
        Ok(reply(InteractionResponseData { embeds: Some(vec![embed]), ..Default::default() }))
    }

    async fn on_stats_command(&self, caller: UserId, options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        let user = match option(options, "user") {
            None => caller,
            Some(CommandOptionValue::User(user)) => *user,
            Some(_) => return Err(error::Error::InvalidParams),
        };

        let Some(stats) = self.runner.leaderboard().user_stats(user.into_nonzero()).await? else {
            return Ok(ephemeral(format!("<@{user}> has not finished any quiz yet.")));
        };

        let average_time = stats.average_time.map_or_else(|| String::from("n/a"), |time| format!("{time:.1} seconds"));
        let best_time = stats.best_time.map_or_else(|| String::from("n/a"), |time| format!("{time} seconds"));
        let title = format!("Statistics of {}", stats.username.as_deref().unwrap_or("an unnamed player"));
        let mut embed = session::embed(title, Some(format!("<@{user}>")), 0x236EA5);
        embed.fields = vec![
            session::field("Rank", format!("#{}", stats.rank), true),
            session::field("Total score", stats.total_score.to_string(), true),
            session::field("Quizzes", stats.quizzes.to_string(), true),
            session::field("Average score", format!("{:.1}", stats.average_score), true),
            session::field("Average answer time", average_time, true),
            session::field("Best time", best_time, true),
        ];
        Ok(reply(InteractionResponseData { embeds: Some(vec![embed]), ..Default::default() }))
    }

    async fn on_quizzes_command(&self) -> error::Result<InteractionResponse> {
        let filter = QuizFilter { active_only: true, ..Default::default() };
        let quizzes = self.runner.repo().list_quizzes(filter).await?;
        if quizzes.is_empty() {
            return Ok(ephemeral(String::from("There are no quizzes yet.")));
        }

        let lines: Vec<_> = quizzes
            .iter()
            .map(|quiz| {
                let lock = if quiz.private { " (private)" } else { "" };
                format!("`{}` **{}**{lock}", quiz.id, quiz.title)
            })
            .collect();
        let embed = session::embed(String::from("Available quizzes"), Some(lines.join("\n")), 0x236EA5);
        Ok(reply(InteractionResponseData {
            embeds: Some(vec![embed]),
            flags: Some(MessageFlags::EPHEMERAL),
            ..Default::default()
        }))
    }

    async fn on_delete_command(&self, user: UserId, options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        let reference = string_option(options, "quiz")?.ok_or(error::Error::InvalidParams)?;
        let quiz = self.resolve_quiz(reference).await?;
        if quiz.owner.is_some_and(|owner| owner != user.into_nonzero()) {
            return Err(error::Error::NotOwner);
        }
        self.runner.repo().delete_quiz(quiz.id).await?;
        log::info!("quiz {} deleted by user {user}", quiz.id);
        Ok(ephemeral(format!("Deleted quiz **{}**.", quiz.title)))
    }

    async fn on_generate_command(&self, user: UserId, options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        let corpus = string_option(options, "corpus")?.ok_or(error::Error::InvalidParams)?;
        let title = string_option(options, "title")?.ok_or(error::Error::InvalidParams)?;
        let count = integer_option(options, "count")?.unwrap_or(DEFAULT_GENERATED).clamp(1, MAX_GENERATED);
        let count = usize::try_from(count).map_err(|_| error::Error::InvalidParams)?;

        let repo = self.runner.repo();
        let corpus = repo.find_corpus_by_title(corpus).await?.ok_or(error::Error::UnknownCorpus)?;
        let entries = repo.list_corpus_entries(corpus.id).await?;
        let questions = {
            let mut rng = rand::rng();
            generate(&entries, count, GENERATED_POINTS, &mut rng)
        };
        if questions.is_empty() {
            return Err(error::Error::EmptyCorpus);
        }

        let quiz = NewQuiz {
            title: String::from(title),
            description: Some(format!("Generated from {}.", corpus.title)),
            private: false,
            time_limit: None,
            owner: Some(user.into_nonzero()),
        };
        let quiz = repo.create_quiz(&quiz, &questions).await?;
        log::info!("quiz {} generated from corpus {} by user {user}", quiz.id, corpus.id);
        Ok(ephemeral(format!("Created quiz **{}** (`{}`) with {} questions.", quiz.title, quiz.id, questions.len())))
    }

    fn on_help_command() -> InteractionResponse {
        let mut embed = session::embed(String::from("Commands"), None, 0x236EA5);
        embed.fields = HELP.iter().map(|(name, text)| session::field(name, String::from(*text), false)).collect();
        reply(InteractionResponseData { embeds: Some(vec![embed]), flags: Some(MessageFlags::EPHEMERAL), ..Default::default() })
    }

    async fn on_msg_component(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let at = interaction_time(interaction.id).unwrap_or_else(Utc::now);
        let User { id, name, .. } =
            interaction.member.and_then(|member| member.user).or(interaction.user).ok_or(error::Error::UnknownUser)?;
        let data = interaction.data.ok_or(error::Error::Fatal)?;
        let InteractionData::MessageComponent(data) = data else {
            return Err(error::Error::Fatal);
        };

        let action: Action = data.custom_id.parse().map_err(|_| error::Error::Malformed)?;
        let content = match action {
            Action::Join(session) => {
                let count = self.runner.join(session, Caller { id, name }).await?;
                format!("You are in! {count} participant(s) so far.")
            }
            Action::Begin(session) => {
                self.runner.manual_start(session).await?;
                String::from("Starting the quiz!")
            }
            Action::Answer { session, question, option } => {
                let event = AnswerEvent { session, question, option, user: id, at };
                let answer = self.runner.answer(event).await?;
                session::feedback(&answer)
            }
            Action::Hint { session, question, hint } => {
                let hint = self.runner.hint(session, question, hint).await?;
                format!("**{}**\n{}", hint.title, hint.text)
            }
        };
        Ok(ephemeral(content))
    }
}

#[cfg(test)]
mod tests {
    use super::Bot;
    use crate::{
        session::Runner,
        settings::Settings,
        testing::{MemoryRepo, RecordingChat},
    };
    use core::num::NonZeroU64;
    use db::{CorpusEntry, NewQuiz, QuizFilter, Repository};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use twilight_model::{
        application::interaction::Interaction,
        http::interaction::{InteractionResponse, InteractionResponseType},
        id::Id,
    };

    fn bot() -> (Bot, Arc<MemoryRepo>) {
        let repo = Arc::new(MemoryRepo::default());
        let runner = Runner::new(repo.clone(), Arc::new(RecordingChat::default()), Settings::default());
        (Bot::new(runner, NonZeroU64::new(42).unwrap()), repo)
    }

    fn interaction(id: u64, user: u64, kind: u8, data: Value) -> Interaction {
        serde_json::from_value(json!({
            "id": id.to_string(),
            "application_id": "42",
            "type": kind,
            "token": "token",
            "version": 1,
            "channel": { "id": "77", "type": 0 },
            "user": { "id": user.to_string(), "username": format!("user{user}"), "discriminator": "0", "avatar": null },
            "data": data,
        }))
        .unwrap()
    }

    fn command(user: u64, name: &str, options: Value) -> Interaction {
        interaction(1, user, 2, json!({ "id": "3", "name": name, "type": 1, "options": options }))
    }

    fn click(user: u64, custom_id: &str) -> Interaction {
        interaction(2, user, 3, json!({ "custom_id": custom_id, "component_type": 2 }))
    }

    fn content(reply: InteractionResponse) -> String {
        assert_eq!(reply.kind, InteractionResponseType::ChannelMessageWithSource);
        reply.data.and_then(|data| data.content).unwrap_or_default()
    }

    fn capitals() -> Vec<CorpusEntry> {
        [("France", "Paris"), ("Italy", "Rome"), ("Spain", "Madrid"), ("Japan", "Tokyo")]
            .into_iter()
            .map(|(country, capital)| CorpusEntry {
                corpus_id: 0,
                tags: vec![String::from("capitals")],
                question_variants: vec![format!("Capital of {country}?")],
                answer_variants: vec![String::from(capital)],
                hint_titles: Vec::new(),
                hint_variants: Vec::new(),
            })
            .collect()
    }

    fn generate_options(count: i64) -> Value {
        json!([
            { "name": "corpus", "type": 3, "value": "Capitals" },
            { "name": "title", "type": 3, "value": "Capitals quiz" },
            { "name": "count", "type": 4, "value": count },
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn generated_quizzes_are_owned_by_their_author() {
        let (bot, repo) = bot();
        repo.add_corpus("Capitals", capitals());

        let reply = content(bot.on_message(command(5, "generate", generate_options(3))).await);
        assert!(reply.contains("with 3 questions"), "{reply}");
        let quizzes = repo.list_quizzes(QuizFilter::default()).await.unwrap();
        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].owner, NonZeroU64::new(5));
        assert_eq!(repo.list_questions(quizzes[0].id).await.unwrap().len(), 3);

        let again = content(bot.on_message(command(5, "generate", generate_options(3))).await);
        assert_eq!(again, "A quiz with that title already exists.");

        let options = json!([{ "name": "quiz", "type": 3, "value": "Capitals quiz" }]);
        let denied = content(bot.on_message(command(6, "delete", options.clone())).await);
        assert_eq!(denied, "Only the owner of this quiz may do that.");
        let deleted = content(bot.on_message(command(5, "delete", options)).await);
        assert_eq!(deleted, "Deleted quiz **Capitals quiz**.");
        assert!(repo.list_quizzes(QuizFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quiz_listings_honour_their_page_size() {
        let (_, repo) = bot();
        for title in ["Rivers", "Mountains", "Deserts"] {
            let quiz = NewQuiz { title: String::from(title), description: None, private: false, time_limit: None, owner: None };
            repo.create_quiz(&quiz, &[]).await.unwrap();
        }

        assert_eq!(repo.list_quizzes(QuizFilter::default()).await.unwrap().len(), 3);
        let page = repo.list_quizzes(QuizFilter { offset: 1, limit: 1, ..Default::default() }).await.unwrap();
        assert_eq!(page.iter().map(|quiz| quiz.title.as_str()).collect::<Vec<_>>(), ["Mountains"]);
        assert!(repo.list_quizzes(QuizFilter { limit: 0, ..Default::default() }).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn buttons_drive_the_join_phase() {
        let (bot, repo) = bot();
        repo.add_corpus("Capitals", capitals());
        bot.on_message(command(5, "generate", generate_options(2))).await;

        let options = json!([{ "name": "quiz", "type": 3, "value": "Capitals quiz" }]);
        let started = content(bot.on_message(command(5, "start", options.clone())).await);
        assert_eq!(started, "**Capitals quiz** is open for participants for 30 seconds.");
        let busy = content(bot.on_message(command(5, "start", options)).await);
        assert_eq!(busy, "A quiz is already running in this channel.");

        let session = bot.runner.by_channel(Id::new(77)).await.unwrap();
        let join = format!("join:{}", session.simple());
        assert_eq!(content(bot.on_message(click(6, &join)).await), "You are in! 1 participant(s) so far.");
        assert_eq!(content(bot.on_message(click(6, &join)).await), "You have already joined this quiz.");
        assert_eq!(content(bot.on_message(click(6, "join:nonsense")).await), "That button no longer makes sense to us.");

        let begin = format!("begin:{}", session.simple());
        assert_eq!(content(bot.on_message(click(6, &begin)).await), "Starting the quiz!");
        assert_eq!(content(bot.on_message(click(6, &begin)).await), "This quiz has already started.");

        let stopped = content(bot.on_message(command(5, "stop", json!([]))).await);
        assert_eq!(stopped, "The quiz has been stopped.");
        let idle = content(bot.on_message(command(5, "stop", json!([]))).await);
        assert_eq!(idle, "There is no quiz running in this channel.");
    }

    #[tokio::test]
    async fn unknown_commands_are_reported() {
        let (bot, _) = bot();
        let reply = content(bot.on_message(command(5, "dance", json!([]))).await);
        assert_eq!(reply, "Unknown command name.");
    }
}
