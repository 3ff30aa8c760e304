//! Scheduling run handlers

use axum::{Json, extract::State, http::StatusCode};
use std::sync::Arc;

use crate::prelude::*;
use coursemail_core::send_time::date_ist;
use coursemail_planner::{
	CourseApplicationRequest, InternalScheduleRequest, LearnerScheduleRequest, PlanReport,
	Planner, ReminderOptions, ReminderRequest, RoleRecipients,
};

type PlanResponse = ClResult<(StatusCode, Json<ApiResponse<PlanReport>>)>;

fn planned(report: PlanReport) -> PlanResponse {
	Ok((StatusCode::OK, Json(ApiResponse::new(report))))
}

/// POST /api/schedule-email - Learner welcome mails for a batch
pub async fn post_learner_schedule(
	State(app): State<App>,
	Json(req): Json<LearnerScheduleRequest>,
) -> PlanResponse {
	let planner = app.ext::<Arc<Planner>>()?;
	planned(planner.schedule_learner_emails(&req).await?)
}

/// POST /api/internal/schedule - Mails for trainers, coordinators and admins
pub async fn post_internal_schedule(
	State(app): State<App>,
	Json(req): Json<InternalScheduleRequest>,
) -> PlanResponse {
	let planner = app.ext::<Arc<Planner>>()?;
	let configured =
		RoleRecipients::from_json(&app.settings.get_json("planner.role_recipients").await?)?;
	planned(planner.schedule_internal_emails(&req, &configured).await?)
}

/// POST /api/course-application/schedule
pub async fn post_course_application(
	State(app): State<App>,
	Json(req): Json<CourseApplicationRequest>,
) -> PlanResponse {
	let planner = app.ext::<Arc<Planner>>()?;
	planned(planner.schedule_course_application(&req).await?)
}

/// POST /api/reminders/weekly-quiz
pub async fn post_weekly_quiz_reminders(
	State(app): State<App>,
	Json(req): Json<ReminderRequest>,
) -> PlanResponse {
	let planner = app.ext::<Arc<Planner>>()?;
	let opts = ReminderOptions::load(&app.settings).await?;
	let today = date_ist(Timestamp::now());
	planned(planner.schedule_weekly_quiz_reminders(&opts, today, req.batch_no.as_deref()).await?)
}

/// POST /api/reminders/intermediate-assessment
pub async fn post_assessment_reminders(
	State(app): State<App>,
	Json(req): Json<ReminderRequest>,
) -> PlanResponse {
	let planner = app.ext::<Arc<Planner>>()?;
	let opts = ReminderOptions::load(&app.settings).await?;
	let today = date_ist(Timestamp::now());
	planned(planner.schedule_assessment_reminders(&opts, today, req.batch_no.as_deref()).await?)
}

// vim: ts=4
