mod api_workflows;
mod pg_action_log;
