use axum::{
	Router,
	routing::{get, patch, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::App;
use crate::handler::{self, attendance, mail, schedule, settings, template};

pub fn init(app: App) -> Router {
	Router::new()
		.route("/api/health", get(handler::get_health))
		// Templates
		.route("/api/templates", get(template::list_templates).post(template::post_template))
		.route(
			"/api/templates/{id}",
			patch(template::patch_template).delete(template::delete_template),
		)
		// Scheduling runs
		.route("/api/schedule-email", post(schedule::post_learner_schedule))
		.route("/api/internal/schedule", post(schedule::post_internal_schedule))
		.route("/api/course-application/schedule", post(schedule::post_course_application))
		.route("/api/reminders/weekly-quiz", post(schedule::post_weekly_quiz_reminders))
		.route(
			"/api/reminders/intermediate-assessment",
			post(schedule::post_assessment_reminders),
		)
		// Queue
		.route("/api/dispatch/run", post(mail::post_dispatch_run))
		.route("/api/mail-dashboard/list", get(mail::list_mails))
		.route("/api/mail/content", get(mail::get_mail_content))
		.route("/api/mail/resend", post(mail::post_resend))
		.route("/api/mail/update-email", post(mail::post_update_recipient))
		.route("/api/resend-failed-emails", post(mail::post_requeue_failed))
		.route("/api/debug/scheduled-emails", get(mail::list_latest))
		// Attendance
		.route("/api/attendance/upload", post(attendance::post_attendance))
		// Settings
		.route("/api/settings", get(settings::list_settings))
		.route(
			"/api/settings/{key}",
			put(settings::update_setting).delete(settings::delete_setting),
		)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
		.with_state(app)
}

// vim: ts=4
