//! Small demo: two neighbours in one cluster, a post, an offer and a chat,
//! printed from the live views.

use std::{env, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use neighborly::error::NbResult;
use neighborly::identity::Identity;
use neighborly::model::{NewPost, NewResponse, NewUser, PostType, ResponseType};
use neighborly::AppBuilder;
use neighborly_store_adapter_redb::{AdapterConfig, StoreAdapterRedb};
use tracing::{error, info};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Config {
	pub db_dir: PathBuf,
	pub postcode: String,
}

impl Config {
	fn from_env() -> Self {
		Self {
			db_dir: PathBuf::from(env::var("DB_DIR").unwrap_or_else(|_| "./data".to_string())),
			postcode: env::var("DEMO_POSTCODE").unwrap_or_else(|_| "SW1A 1AA".to_string()),
		}
	}
}

fn user(email: &str, first_name: &str) -> NewUser {
	NewUser { email: email.into(), first_name: Some(first_name.into()), last_name: None }
}

async fn run(config: Config) -> NbResult<()> {
	let store = Arc::new(StoreAdapterRedb::new(config.db_dir, AdapterConfig::default()).await?);
	let mut builder = AppBuilder::new();
	builder.store_adapter(store.clone()).change_feed(store);
	let app = builder.build().await?;
	let gw = app.gateway();

	let alice = Identity::user("alice");
	let bob = Identity::user("bob");
	gw.register_user(&alice, user("alice@example.com", "Alice")).await?;
	gw.register_user(&bob, user("bob@example.com", "Bob")).await?;
	let cluster = gw.join_cluster(&alice, &config.postcode).await?;
	gw.join_cluster(&bob, &config.postcode).await?;
	info!("Cluster {} ({})", cluster.id, cluster.postcode);

	let mut activity = app.activity_view(&cluster.id, bob.clone()).await?;
	info!("Activity view live: {}, {} posts", activity.is_live(), activity.posts().len());

	let post = gw
		.create_post(
			&alice,
			NewPost {
				title: "Lift to the pharmacy".into(),
				description: "Thursday morning, back by noon".into(),
				post_type: PostType::HelpNeeded,
			},
		)
		.await?;
	let offer = gw
		.create_response(
			&bob,
			&post.id,
			NewResponse { response_type: ResponseType::OfferHelp, message: Some("Happy to drive".into()) },
		)
		.await?;

	// Let the feed catch up with the writes
	let _ = tokio::time::timeout(SETTLE_TIMEOUT, async {
		while activity.help_offers_count(&post.id) == 0 && activity.next_change().await {}
	})
	.await;
	for p in activity.posts() {
		info!("  {} - {} offers", p.title, activity.help_offers_count(&p.id));
	}

	let session = gw.create_session(&alice, &offer.id).await?;
	gw.send_message(&alice, &session.id, "Thank you! 9am at mine?").await?;

	let sessions = app.sessions_view(&bob).await?;
	for preview in sessions.previews() {
		info!(
			"  chat with {}: {} unread, latest {:?}",
			preview.counterpart,
			preview.unread,
			preview.latest.map(|m| m.body.as_ref())
		);
	}
	info!("Bob has {} unread messages", sessions.unread_count());

	activity.teardown();
	sessions.teardown();
	Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	match run(Config::from_env()).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("Demo failed: {}", err);
			ExitCode::FAILURE
		}
	}
}

// vim: ts=4
