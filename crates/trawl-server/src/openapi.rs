use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Trawl API",
        version = "0.1.0",
        description = "Control surface for the scheduled scrape engine."
    ),
    paths(
        crate::routes::trigger_run,
        crate::routes::reschedule_job,
        crate::routes::list_runs,
        crate::routes::scheduler_status,
        crate::routes::list_records,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::TriggerResponse,
        crate::dto::TimerResponse,
        crate::dto::SchedulerStatusResponse,
        crate::dto::RunResponse,
        crate::dto::RunListResponse,
        crate::dto::RecordResponse,
        crate::dto::RecordListResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "jobs", description = "Manual triggers and rescheduling"),
        (name = "runs", description = "Run log history"),
        (name = "records", description = "Scraped records"),
        (name = "system", description = "Health and scheduler status"),
    )
)]
pub struct ApiDoc;
