//! In-memory registry of running games (§4.5, §11 introspection), the
//! `/enlist`-equivalent route's data source.

use std::collections::HashMap;

use protocol::Team;
use tokio::sync::Mutex;

pub struct GameEntry {
    pub agent_count: u32,
    pub current_day: u32,
    pub finished: Option<Team>,
}

#[derive(Default)]
pub struct GameRegistry {
    games: Mutex<HashMap<String, GameEntry>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        GameRegistry::default()
    }

    pub async fn register(&self, game_id: String, agent_count: u32) {
        self.games.lock().await.insert(
            game_id,
            GameEntry {
                agent_count,
                current_day: 0,
                finished: None,
            },
        );
    }

    pub async fn mark_finished(&self, game_id: &str, winner: Team) {
        if let Some(entry) = self.games.lock().await.get_mut(game_id) {
            entry.finished = Some(winner);
        }
    }

    /// Polls at a low frequency until every tracked game has finished (§4.5
    /// graceful shutdown: "wait until every game in the registry reports
    /// finished"). There is no forced-kill path, so this only returns once
    /// the last in-flight game completes naturally.
    pub async fn wait_until_drained(&self) {
        loop {
            let all_finished = self.games.lock().await.values().all(|entry| entry.finished.is_some());
            if all_finished {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }

    /// A one-line-per-game rendering for the introspection route.
    pub async fn render(&self) -> String {
        let games = self.games.lock().await;
        games
            .iter()
            .map(|(id, entry)| match entry.finished {
                Some(winner) => format!("Game: {id:<36} Agents: {:03} Finished: {winner:?}", entry.agent_count),
                None => format!("Game: {id:<36} Agents: {:03} Day: {:03} In progress", entry.agent_count, entry.current_day),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn render_reflects_registration_and_finish() {
        let registry = GameRegistry::new();
        registry.register("game-1".to_string(), 5).await;
        let rendered = registry.render().await;
        assert!(rendered.contains("game-1"));
        assert!(rendered.contains("In progress"));

        registry.mark_finished("game-1", Team::Villager).await;
        let rendered = registry.render().await;
        assert!(rendered.contains("Finished"));
    }
}
