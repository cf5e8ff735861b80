//! Class names: COCO ids as emitted by the SSD graph, and the display labels
//! shown on the overlay.

/// COCO-SSD class name for a 1-based COCO category id. The 90-entry label map
/// has gaps (12, 26, 29, ...) for categories that were never annotated.
pub fn coco_class_name(id: u32) -> Option<&'static str> {
    let name = match id {
        1 => "person",
        2 => "bicycle",
        3 => "car",
        4 => "motorcycle",
        5 => "airplane",
        6 => "bus",
        7 => "train",
        8 => "truck",
        9 => "boat",
        10 => "traffic light",
        11 => "fire hydrant",
        13 => "stop sign",
        14 => "parking meter",
        15 => "bench",
        16 => "bird",
        17 => "cat",
        18 => "dog",
        19 => "horse",
        20 => "sheep",
        21 => "cow",
        22 => "elephant",
        23 => "bear",
        24 => "zebra",
        25 => "giraffe",
        27 => "backpack",
        28 => "umbrella",
        31 => "handbag",
        32 => "tie",
        33 => "suitcase",
        34 => "frisbee",
        35 => "skis",
        36 => "snowboard",
        37 => "sports ball",
        38 => "kite",
        39 => "baseball bat",
        40 => "baseball glove",
        41 => "skateboard",
        42 => "surfboard",
        43 => "tennis racket",
        44 => "bottle",
        46 => "wine glass",
        47 => "cup",
        48 => "fork",
        49 => "knife",
        50 => "spoon",
        51 => "bowl",
        52 => "banana",
        53 => "apple",
        54 => "sandwich",
        55 => "orange",
        56 => "broccoli",
        57 => "carrot",
        58 => "hot dog",
        59 => "pizza",
        60 => "donut",
        61 => "cake",
        62 => "chair",
        63 => "couch",
        64 => "potted plant",
        65 => "bed",
        67 => "dining table",
        70 => "toilet",
        72 => "tv",
        73 => "laptop",
        74 => "mouse",
        75 => "remote",
        76 => "keyboard",
        77 => "cell phone",
        78 => "microwave",
        79 => "oven",
        80 => "toaster",
        81 => "sink",
        82 => "refrigerator",
        84 => "book",
        85 => "clock",
        86 => "vase",
        87 => "scissors",
        88 => "teddy bear",
        89 => "hair drier",
        90 => "toothbrush",
        _ => return None,
    };
    Some(name)
}

/// Display label for a detector class id. Ids without an entry are shown as-is.
pub fn translate(class_id: &str) -> &str {
    match class_id {
        "person" => "人",
        "bicycle" => "自行车",
        "car" => "汽车",
        "motorcycle" => "摩托车",
        "airplane" => "飞机",
        "bus" => "公交车",
        "train" => "火车",
        "truck" => "卡车",
        "boat" => "船",
        "traffic light" => "红绿灯",
        "fire hydrant" => "消防栓",
        "stop sign" => "停车标志",
        "parking meter" => "停车计时器",
        "bench" => "长椅",
        "bird" => "鸟",
        "cat" => "猫",
        "dog" => "狗",
        "horse" => "马",
        "sheep" => "羊",
        "cow" => "牛",
        "elephant" => "大象",
        "bear" => "熊",
        "zebra" => "斑马",
        "giraffe" => "长颈鹿",
        "backpack" => "背包",
        "umbrella" => "雨伞",
        "handbag" => "手提包",
        "tie" => "领带",
        "suitcase" => "行李箱",
        "frisbee" => "飞盘",
        "skis" => "滑雪板",
        "snowboard" => "单板滑雪板",
        "sports ball" => "球",
        "kite" => "风筝",
        "baseball bat" => "棒球棒",
        "baseball glove" => "棒球手套",
        "skateboard" => "滑板",
        "surfboard" => "冲浪板",
        "tennis racket" => "网球拍",
        "bottle" => "瓶子",
        "wine glass" => "酒杯",
        "cup" => "杯子",
        "fork" => "叉子",
        "knife" => "刀",
        "spoon" => "勺子",
        "bowl" => "碗",
        "banana" => "香蕉",
        "apple" => "苹果",
        "sandwich" => "三明治",
        "orange" => "橙子",
        "broccoli" => "西兰花",
        "carrot" => "胡萝卜",
        "hot dog" => "热狗",
        "pizza" => "披萨",
        "donut" => "甜甜圈",
        "cake" => "蛋糕",
        "chair" => "椅子",
        "couch" => "沙发",
        "potted plant" => "盆栽",
        "bed" => "床",
        "dining table" => "餐桌",
        "toilet" => "马桶",
        "tv" => "电视",
        "laptop" => "笔记本电脑",
        "mouse" => "鼠标",
        "remote" => "遥控器",
        "keyboard" => "键盘",
        "cell phone" => "手机",
        "microwave" => "微波炉",
        "oven" => "烤箱",
        "toaster" => "烤面包机",
        "sink" => "水槽",
        "refrigerator" => "冰箱",
        "book" => "书",
        "clock" => "时钟",
        "vase" => "花瓶",
        "scissors" => "剪刀",
        "teddy bear" => "泰迪熊",
        "hair drier" => "吹风机",
        "toothbrush" => "牙刷",
        other => other,
    }
}
