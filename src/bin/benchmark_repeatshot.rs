// 该文件是 Fenjian （分拣） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 同一上传图像的重复处理基准
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use fenjian::{
  FromUrl, Pipeline, PipelineConfig, PipelineContext, input::ImageFileInput,
  model::Yolov8SegBuilder,
};

/// 重复处理同一张上传图像并统计耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 上传图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 重复次数
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub repeat: usize,
  /// 预热次数，不计入平均耗时
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub warmup: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  if args.repeat <= args.warmup {
    bail!("重复次数必须大于预热次数");
  }

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);

  let model = Yolov8SegBuilder::from_url(&args.model)?.build()?;
  let pipeline = Pipeline::new(PipelineContext::new(model), PipelineConfig::default())?;

  let upload = ImageFileInput::from_url(&args.input)?
    .next()
    .ok_or_else(|| anyhow!("没有输入图像"))?;

  info!("开始任务...");
  let mut times = Vec::with_capacity(args.repeat);
  let mut first_labels = None;
  for i in 0..args.repeat {
    let now = Instant::now();
    let processed = pipeline.process(&upload)?;
    let elapsed = now.elapsed();
    info!("({})处理完成，耗时: {:.2?}", i, elapsed);
    times.push(elapsed);

    let labels = first_labels.get_or_insert_with(|| processed.labels.clone());
    if *labels != processed.labels {
      bail!(
        "第 {} 次处理的标签与首次不一致: [{}] / [{}]",
        i,
        processed.labels,
        labels
      );
    }
  }

  if let Some(labels) = &first_labels {
    info!("标签: [{}]", labels);
  }
  warn!(
    "平均处理时间: {:.2?}",
    times.iter().skip(args.warmup).sum::<Duration>() / (times.len() - args.warmup) as u32
  );

  Ok(())
}
