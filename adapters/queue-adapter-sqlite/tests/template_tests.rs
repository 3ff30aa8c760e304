//! Template, reference data, and settings tests

use coursemail::queue_adapter::{
	BatchTypeFilter, CreateTemplate, DeliveryMode, Learner, ListTemplateOptions, ListTopicOptions,
	PlannerTopic, QueueAdapter, TemplateCategory, UpdateTemplate,
};
use coursemail::types::Patch;
use coursemail_queue_adapter_sqlite::QueueAdapterSqlite;
use tempfile::TempDir;

async fn create_test_adapter() -> (QueueAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = QueueAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	(adapter, temp_dir)
}

fn learner_template(name: &str, mode: DeliveryMode, batch_type: Option<&str>) -> CreateTemplate {
	CreateTemplate {
		template_name: name.to_string(),
		category: TemplateCategory::Learner,
		mode: Some(mode),
		batch_type: batch_type.map(ToString::to_string),
		user_role: None,
		recipient_emails: None,
		offset_days: 0,
		send_time: None,
		subject: "Welcome {{name}}".to_string(),
		body_html: "<p>{{batch_no}} starts {{start_date}}</p>".to_string(),
		active: true,
	}
}

fn topic(batch_no: &str, date: &str, name: &str, trainer: Option<&str>) -> PlannerTopic {
	PlannerTopic {
		batch_no: batch_no.into(),
		date: date.into(),
		topic_name: name.into(),
		trainer_name: trainer.map(|_| "Trainer".into()),
		trainer_email: trainer.map(Into::into),
		mode: None,
	}
}

#[tokio::test]
async fn test_create_and_read_template() {
	let (adapter, _temp) = create_test_adapter().await;

	let id = adapter
		.create_template(&learner_template("Welcome", DeliveryMode::Online, None))
		.await
		.expect("Should create template");
	let tpl = adapter.read_template(id).await.expect("Should read template");

	assert_eq!(&*tpl.template_name, "Welcome");
	assert_eq!(tpl.category, TemplateCategory::Learner);
	assert_eq!(tpl.mode, Some(DeliveryMode::Online));
	assert_eq!(&*tpl.send_time, "09:00");
	assert!(tpl.active);
}

#[tokio::test]
async fn test_list_templates_by_batch_type() {
	let (adapter, _temp) = create_test_adapter().await;
	adapter.create_template(&learner_template("Online", DeliveryMode::Online, None)).await.unwrap();
	adapter
		.create_template(&learner_template("Offline WE", DeliveryMode::Offline, Some("Weekend")))
		.await
		.unwrap();
	adapter
		.create_template(&learner_template("Offline WD", DeliveryMode::Offline, Some("Weekday")))
		.await
		.unwrap();

	let offline = adapter
		.list_templates(&ListTemplateOptions {
			category: Some(TemplateCategory::Learner),
			mode: Some(DeliveryMode::Offline),
			batch_type: BatchTypeFilter::Is("Weekend".into()),
			active_only: true,
			..Default::default()
		})
		.await
		.unwrap();
	assert_eq!(offline.len(), 1);
	assert_eq!(&*offline[0].template_name, "Offline WE");

	let online = adapter
		.list_templates(&ListTemplateOptions {
			mode: Some(DeliveryMode::Online),
			batch_type: BatchTypeFilter::Unset,
			..Default::default()
		})
		.await
		.unwrap();
	assert_eq!(online.len(), 1);
}

#[tokio::test]
async fn test_update_template_patch() {
	let (adapter, _temp) = create_test_adapter().await;
	let id = adapter
		.create_template(&learner_template("Welcome", DeliveryMode::Offline, Some("Weekend")))
		.await
		.unwrap();

	let patch = UpdateTemplate {
		batch_type: Patch::Null,
		offset_days: Patch::Value(-2),
		active: Patch::Value(false),
		..Default::default()
	};
	adapter.update_template(id, &patch).await.expect("Should update");

	let tpl = adapter.read_template(id).await.unwrap();
	assert!(tpl.batch_type.is_none());
	assert_eq!(tpl.offset_days, -2);
	assert!(!tpl.active);
	assert_eq!(&*tpl.subject, "Welcome {{name}}");

	let inactive_hidden = adapter
		.list_templates(&ListTemplateOptions { active_only: true, ..Default::default() })
		.await
		.unwrap();
	assert!(inactive_hidden.is_empty());
}

#[tokio::test]
async fn test_delete_missing_template() {
	let (adapter, _temp) = create_test_adapter().await;
	assert!(adapter.delete_template(7).await.is_err());
}

#[tokio::test]
async fn test_batch_reference_data() {
	let (adapter, _temp) = create_test_adapter().await;
	adapter.add_planner_topic(&topic("PDFT-101", "2025-01-08", "STA", Some("t1@x.in"))).await.unwrap();
	adapter.add_planner_topic(&topic("PDFT-101", "2025-01-06", "Intro", Some("t2@x.in"))).await.unwrap();
	adapter.add_planner_topic(&topic("PDFT-101", "2025-01-07", "Lab", Some("t1@x.in"))).await.unwrap();
	adapter.add_planner_topic(&topic("PDFT-101", "2025-01-09", "Self study", None)).await.unwrap();
	adapter.add_planner_topic(&topic("VLSI-7", "2024-12-01", "Intro", None)).await.unwrap();

	let start = adapter.read_batch_start_date("PDFT-101").await.unwrap();
	assert_eq!(start.as_deref(), Some("2025-01-06"));
	assert!(adapter.read_batch_start_date("NOPE").await.unwrap().is_none());

	let trainers = adapter.list_trainer_emails("PDFT-101").await.unwrap();
	assert_eq!(trainers.len(), 2);

	let window = adapter
		.list_planner_topics(&ListTopicOptions {
			date_from: Some("2025-01-07".into()),
			date_to: Some("2025-01-08".into()),
			..Default::default()
		})
		.await
		.unwrap();
	assert_eq!(window.len(), 2);
	assert_eq!(&*window[0].topic_name, "Lab");
}

#[tokio::test]
async fn test_learners_and_forms() {
	let (adapter, _temp) = create_test_adapter().await;
	for (email, status) in [("a@x.in", None), ("b@x.in", Some("Dropped"))] {
		adapter
			.add_learner(&Learner {
				batch_no: "PDFT-101".into(),
				name: Some("A".into()),
				email: email.into(),
				status: status.map(Into::into),
			})
			.await
			.unwrap();
	}

	let learners = adapter.list_learners("PDFT-101").await.unwrap();
	assert_eq!(learners.len(), 1);

	assert_eq!(adapter.update_learner_email("PDFT-101", "a@x.in", "a2@x.in").await.unwrap(), 1);
	assert_eq!(&*adapter.list_learners("PDFT-101").await.unwrap()[0].email, "a2@x.in");

	assert!(adapter.read_batch_form_url("PDFT-101").await.unwrap().is_none());
	adapter.set_batch_form_url("PDFT-101", "https://forms.example/pdft").await.unwrap();
	assert_eq!(
		adapter.read_batch_form_url("PDFT-101").await.unwrap().as_deref(),
		Some("https://forms.example/pdft")
	);
}

#[tokio::test]
async fn test_settings_store() {
	let (adapter, _temp) = create_test_adapter().await;

	adapter.update_setting("dispatch.batch_size", Some(serde_json::json!(25))).await.unwrap();
	assert_eq!(
		adapter.read_setting("dispatch.batch_size").await.unwrap(),
		Some(serde_json::json!(25))
	);
	assert_eq!(adapter.list_settings().await.unwrap().len(), 1);

	adapter.update_setting("dispatch.batch_size", None).await.unwrap();
	assert!(adapter.read_setting("dispatch.batch_size").await.unwrap().is_none());
}

// vim: ts=4
