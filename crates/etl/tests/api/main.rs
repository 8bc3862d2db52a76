mod helpers;
mod pipeline_run;
