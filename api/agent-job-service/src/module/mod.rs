pub mod agent_job;
