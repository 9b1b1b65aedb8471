//! Remote document listing.

use std::path::PathBuf;

use console::style;

use crate::{
   Result,
   remote::{DifyApi, ListQuery, RemoteClient},
};

pub async fn execute(
   config_path: Option<PathBuf>,
   dataset: &str,
   query: ListQuery,
   json: bool,
) -> Result<()> {
   let cfg = super::open_config(config_path).snapshot();
   let api = DifyApi::new(cfg.request_timeout())?;
   let client = RemoteClient::new(&api, &cfg)?;
   let page = client.list(dataset, query).await?;

   if json {
      println!("{}", serde_json::to_string_pretty(&page)?);
      return Ok(());
   }

   if page.data.is_empty() {
      println!("{}", style("No documents").dim());
      return Ok(());
   }
   for doc in &page.data {
      println!("{}  {}", style(&doc.id).dim(), doc.name);
   }
   println!(
      "\n{}",
      style(format!(
         "page {} ({} per page), {} total{}",
         page.page,
         page.limit,
         page.total,
         if page.has_more { ", more available" } else { "" }
      ))
      .dim()
   );
   Ok(())
}
